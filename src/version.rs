/// Build version reported by `--version` and at startup. Release builds
/// may stamp it through `APP_VERSION`.
pub const VERSION: &str = match option_env!("APP_VERSION") {
    Some(version) => version,
    None => env!("CARGO_PKG_VERSION"),
};
