use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const MIN_BCRYPT_COST: u32 = 4;
pub const MAX_BCRYPT_COST: u32 = 31;
/// Ten years.
pub const MAX_TOKEN_TTL_HOURS: i64 = 10 * 366 * 24;

#[derive(Deserialize, Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub jwt_secret: String,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,

    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,

    #[serde(default = "default_max_db_connections")]
    pub max_db_connections: u32,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialServerConfig {
    database_url: Option<String>,
    jwt_secret: Option<String>,
    listen_addr: Option<String>,
    log_dir: Option<String>,
    token_ttl_hours: Option<i64>,
    bcrypt_cost: Option<u32>,
    max_db_connections: Option<u32>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_token_ttl_hours() -> i64 {
    168
}

fn default_bcrypt_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

fn default_max_db_connections() -> u32 {
    10
}

impl PartialServerConfig {
    fn from_file(path_str: &str) -> Result<Self, String> {
        let path = Path::new(path_str);
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file at {path:?}: {e}"))?;
        toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse TOML from config file at {path:?}: {e}"))
    }
}

impl ServerConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self, String> {
        dotenv::dotenv().ok();

        // 1. Load from file (optional)
        let file_config = match config_path {
            Some(path) => PartialServerConfig::from_file(path)?,
            None => PartialServerConfig::default(),
        };

        // 2. Load from environment variables
        let env_config: PartialServerConfig = envy::from_env::<PartialServerConfig>()
            .map_err(|e| format!("Failed to load config from environment: {e}"))?;

        // 3. Merge: environment overrides file
        Self::merge(env_config, file_config)
    }

    fn merge(
        env_config: PartialServerConfig,
        file_config: PartialServerConfig,
    ) -> Result<Self, String> {
        let config = ServerConfig {
            database_url: env_config.database_url.or(file_config.database_url)
                .ok_or("DATABASE_URL is required")?,
            jwt_secret: env_config.jwt_secret.or(file_config.jwt_secret)
                .ok_or("JWT_SECRET is required")?,
            listen_addr: env_config.listen_addr.or(file_config.listen_addr)
                .unwrap_or_else(default_listen_addr),
            log_dir: env_config.log_dir.or(file_config.log_dir)
                .unwrap_or_else(default_log_dir),
            token_ttl_hours: env_config.token_ttl_hours.or(file_config.token_ttl_hours)
                .unwrap_or_else(default_token_ttl_hours),
            bcrypt_cost: env_config.bcrypt_cost.or(file_config.bcrypt_cost)
                .unwrap_or_else(default_bcrypt_cost),
            max_db_connections: env_config.max_db_connections.or(file_config.max_db_connections)
                .unwrap_or_else(default_max_db_connections),
        };

        if !(1..=MAX_TOKEN_TTL_HOURS).contains(&config.token_ttl_hours) {
            return Err(format!("TOKEN_TTL_HOURS must be between 1 and {MAX_TOKEN_TTL_HOURS}"));
        }
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&config.bcrypt_cost) {
            return Err(format!(
                "BCRYPT_COST must be between {MIN_BCRYPT_COST} and {MAX_BCRYPT_COST}"
            ));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(contents: &str) -> PartialServerConfig {
        toml::from_str(contents).unwrap()
    }

    #[test]
    fn test_defaults_fill_optional_keys() {
        let file = from_toml(
            r#"
            database_url = "postgres://app@localhost/recipes"
            jwt_secret = "secret"
            "#,
        );
        let config = ServerConfig::merge(PartialServerConfig::default(), file).unwrap();

        assert_eq!(config.database_url, "postgres://app@localhost/recipes");
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.log_dir, "logs");
        assert_eq!(config.token_ttl_hours, 168);
        assert_eq!(config.bcrypt_cost, bcrypt::DEFAULT_COST);
        assert_eq!(config.max_db_connections, 10);
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = from_toml(
            r#"
            database_url = "postgres://file/recipes"
            jwt_secret = "file-secret"
            listen_addr = "127.0.0.1:9000"
            "#,
        );
        let env = PartialServerConfig {
            jwt_secret: Some("env-secret".to_string()),
            token_ttl_hours: Some(1),
            ..Default::default()
        };
        let config = ServerConfig::merge(env, file).unwrap();

        assert_eq!(config.jwt_secret, "env-secret");
        assert_eq!(config.database_url, "postgres://file/recipes");
        assert_eq!(config.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.token_ttl_hours, 1);
    }

    #[test]
    fn test_missing_required_keys() {
        let err = ServerConfig::merge(
            PartialServerConfig::default(),
            PartialServerConfig::default(),
        )
        .unwrap_err();
        assert!(err.contains("DATABASE_URL"));

        let file = from_toml(r#"database_url = "postgres://db""#);
        let err = ServerConfig::merge(PartialServerConfig::default(), file).unwrap_err();
        assert!(err.contains("JWT_SECRET"));
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let file = from_toml(
            r#"
            database_url = "postgres://db"
            jwt_secret = "secret"
            bcrypt_cost = 2
            "#,
        );
        assert!(ServerConfig::merge(PartialServerConfig::default(), file).is_err());

        let env = PartialServerConfig {
            database_url: Some("postgres://db".to_string()),
            jwt_secret: Some("secret".to_string()),
            token_ttl_hours: Some(0),
            ..Default::default()
        };
        assert!(ServerConfig::merge(env, PartialServerConfig::default()).is_err());
    }

    #[test]
    fn test_token_ttl_upper_bound() {
        let with_ttl = |ttl: i64| PartialServerConfig {
            database_url: Some("postgres://db".to_string()),
            jwt_secret: Some("secret".to_string()),
            token_ttl_hours: Some(ttl),
            ..Default::default()
        };

        let ok = ServerConfig::merge(with_ttl(MAX_TOKEN_TTL_HOURS), PartialServerConfig::default());
        assert_eq!(ok.unwrap().token_ttl_hours, MAX_TOKEN_TTL_HOURS);

        let err = ServerConfig::merge(
            with_ttl(MAX_TOKEN_TTL_HOURS + 1),
            PartialServerConfig::default(),
        )
        .unwrap_err();
        assert!(err.contains("TOKEN_TTL_HOURS"));
        let huge = ServerConfig::merge(with_ttl(i64::MAX / 2), PartialServerConfig::default());
        assert!(huge.is_err());
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let partial = PartialServerConfig::from_file("/nonexistent/recipe-backend.toml").unwrap();
        assert!(partial.database_url.is_none());
    }
}
