use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use recipe_backend::db;
use recipe_backend::server::config::ServerConfig;
use recipe_backend::services::auth_service;
use recipe_backend::version::VERSION;
use recipe_backend::web::create_axum_router;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Create an active staff account
    CreateSuperuser {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "server.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received.");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Manually check for --version before full parsing to keep the simple output.
    if std::env::args().any(|arg| arg == "--version") {
        println!("Server version: {VERSION}");
        return Ok(());
    }

    let args = Args::parse();

    let config = ServerConfig::load(args.config.as_deref())?;
    init_logging(&config.log_dir);
    info!("Starting server, version: {}", VERSION);

    let db_pool = match db::connect(&config.database_url, config.max_db_connections).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to connect to the database: {}", e);
            return Err(e.into());
        }
    };

    match args.command.unwrap_or(Command::Serve) {
        Command::CreateSuperuser { email, password } => {
            let user = auth_service::create_superuser(
                &db_pool,
                &email,
                &password,
                config.bcrypt_cost,
            )
            .await
            .map_err(|e| e.to_string())?;
            println!("Superuser created: {}", user.email);
            Ok(())
        }
        Command::Serve => {
            let addr: SocketAddr = config.listen_addr.parse()?;
            let app = create_axum_router(db_pool, std::sync::Arc::new(config));

            let listener = TcpListener::bind(addr).await?;
            info!("HTTP API listening on {}", addr);
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
            info!("Server stopped.");
            Ok(())
        }
    }
}
