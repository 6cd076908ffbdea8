use anyhow::{bail, Context, Result};
use log::{error, info};
use std::sync::Arc;
use uuid::Uuid;

use servicedesk::core::shared::utils::{create_conn, run_migrations};
use servicedesk::tickets::seed::legacy_workflow;
use servicedesk::tickets::{PgTicketStore, TicketService, TicketStore};
use servicedesk::{build_router, AppConfig, AppState};

const USAGE: &str = "usage: servicedesk [serve | migrate | seed-legacy <repair-category-uuid> <zoom-category-uuid>]";

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(env_logger::WriteStyle::Always)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = AppConfig::load().context("Failed to load configuration")?;

    let command = args.first().map(String::as_str).unwrap_or("serve");
    match command {
        "serve" => serve(config).await,
        "migrate" => {
            let pool = create_conn(&config.database)?;
            run_migrations(&pool).map_err(|e| anyhow::anyhow!("{e}"))?;
            Ok(())
        }
        "seed-legacy" => {
            let (Some(repair), Some(zoom)) = (args.get(1), args.get(2)) else {
                bail!("{USAGE}");
            };
            let repair = Uuid::parse_str(repair).context("Invalid repair category id")?;
            let zoom = Uuid::parse_str(zoom).context("Invalid zoom category id")?;
            seed_legacy(config, repair, zoom)
        }
        "--help" | "-h" | "help" => {
            println!("{USAGE}");
            Ok(())
        }
        other => bail!("Unknown command '{other}'\n{USAGE}"),
    }
}

fn pg_store(config: &AppConfig) -> Result<Arc<dyn TicketStore>> {
    let pool = create_conn(&config.database)?;
    run_migrations(&pool).map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(Arc::new(PgTicketStore::new(pool)))
}

fn seed_legacy(config: AppConfig, repair: Uuid, zoom: Uuid) -> Result<()> {
    let service = TicketService::new(pg_store(&config)?, config.assignment.clone());
    service.seed_workflow(&legacy_workflow(repair, zoom))?;
    info!("Seeded repair ({repair}) and zoom ({zoom}) workflows");
    Ok(())
}

async fn serve(config: AppConfig) -> Result<()> {
    let store = pg_store(&config)?;
    let state = Arc::new(AppState::new(config.clone(), store));

    let mut events = state.tickets.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => info!(
                    "Ticket {} {}: {:?} -> {}",
                    event.ticket_number, event.event_type, event.old_status, event.new_status
                ),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    error!("Ticket event listener lagged, {skipped} events skipped");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let address = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!("Service desk listening on {address}");

    axum::serve(listener, build_router(state))
        .await
        .context("Server error")
}
