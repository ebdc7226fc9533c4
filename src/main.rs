use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::signal;
use tracing::{error, info};

use quote_engine as engine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = engine::config::load_config().context("failed to load configuration")?;
    engine::config::init_tracing(&cfg.log_level, cfg.log_json);
    engine::metrics::register_metrics();

    // Storage backends
    let (backends, db) = if cfg.uses_database() {
        let db_pool = engine::db::establish_connection_from_app_config(&cfg)
            .await
            .context("failed to connect to database")?;
        if cfg.auto_migrate {
            engine::db::run_migrations(&db_pool).await.map_err(|e| {
                error!("Failed running migrations: {}", e);
                e
            })?;
        }
        let db_arc = Arc::new(db_pool);
        (
            engine::services::Backends::database(db_arc.clone(), &cfg),
            Some(db_arc),
        )
    } else {
        info!("Using in-memory storage; state is lost on restart");
        (engine::services::Backends::in_memory(&cfg), None)
    };

    // Init events
    let (event_sender, event_rx) = engine::events::channel(cfg.event_channel_capacity);
    tokio::spawn(engine::events::process_events(event_rx));

    let services = engine::services::ServiceContainer::new(backends, (&cfg).into(), event_sender);

    let cfg = Arc::new(cfg);
    let app = engine::build_router(engine::AppState {
        db,
        config: cfg.clone(),
        services,
    });

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cfg.host, cfg.port))?;
    info!("quote-engine listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("quote-engine stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
