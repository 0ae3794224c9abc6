use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taskboard::{
    api::{self, AppState},
    config::{Cli, Commands, ServeArgs},
    gate::{self, ReadinessGate},
    views::Views,
};
use taskboard_core::TodoStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "taskboard=debug,taskboard_core=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Migrate(args)) => {
            let db = args.open()?;
            db.initialize()?;
            tracing::info!(database = %db.target(), "schema applied");
        }
        None => serve(cli.serve).await?,
    }

    Ok(())
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let db = args.database.open()?;
    tracing::info!(database = %db.target(), "using database");

    let store: Arc<dyn TodoStore> = Arc::new(db);
    let gate = ReadinessGate::new();
    let state = AppState::new(Arc::clone(&store), gate.clone(), Views::new()?);

    let app = api::create_router(state, Some(args.static_dir.as_path()));

    let listener = tokio::net::TcpListener::bind(args.addr()).await?;
    tracing::info!("Taskboard listening on http://{}", listener.local_addr()?);

    // The server answers 503 until the store is up; if it never comes up
    // the process exits with the initialization error.
    let server = async {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(anyhow::Error::from)
    };
    let bring_up = async {
        gate::bring_up(store, gate, args.retry_policy())
            .await
            .map_err(anyhow::Error::from)
    };

    tokio::try_join!(server, bring_up)?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutting down");
}
