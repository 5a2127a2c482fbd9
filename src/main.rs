mod cli;

use clap::Parser;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::{Cli, Commands, DbCommands, TxCommands, UserCommands};
use fraudwatch_core::config::{Config, ConfigHandle, EngineConfig, LogFormat};
use fraudwatch_core::{create_app, AppState};

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    let engine = ConfigHandle::new(EngineConfig::from_env()?)?;
    let args = Cli::parse();

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(&config, engine).await,
        Commands::Config => cli::handle_config_show(&config, &engine),
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Analyze { file, concurrency } => {
            cli::handle_analyze(&app_state(&config, engine).await?, &file, concurrency).await
        }
        Commands::Stats => cli::handle_stats(&app_state(&config, engine).await?).await,
        Commands::Alerts(cmd) => {
            cli::require_database(&config, "alerts")?;
            cli::handle_alerts(&app_state(&config, engine).await?, cmd).await
        }
        Commands::Tx(TxCommands::Label { id, fraud }) => {
            cli::require_database(&config, "tx label")?;
            cli::handle_tx_label(&app_state(&config, engine).await?, &id, fraud).await
        }
        Commands::User(UserCommands::SetRisk { id, profile }) => {
            cli::require_database(&config, "user set-risk")?;
            cli::handle_user_set_risk(&app_state(&config, engine).await?, &id, profile).await
        }
    }
}

async fn app_state(config: &Config, engine: ConfigHandle) -> anyhow::Result<AppState> {
    let (store, backend) = cli::open_store(config).await?;
    Ok(AppState::new(store, engine, backend))
}

async fn serve(config: &Config, engine: ConfigHandle) -> anyhow::Result<()> {
    let (store, backend) = cli::open_store(config).await?;
    let snapshot = engine.snapshot();
    tracing::info!(
        "Engine ready: {} store, alert threshold {}, store timeout {}ms",
        backend,
        snapshot.alert_threshold,
        snapshot.store_timeout_ms
    );

    let app = create_app(AppState::new(store, engine, backend));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
