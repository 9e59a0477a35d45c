//! `kwikout` operator binary.
//!
//! Connects to `PostgreSQL`, applies migrations and reports every zone's
//! active queue. Configuration comes from the environment (and `.env`).

use kwikout_core::ticket::{TicketState, Zone};
use kwikout_runtime::{Config, bootstrap, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    let config = Config::from_env();
    telemetry::init_tracing(&config.log_filter)?;

    tracing::info!("Starting KwikOut queue");

    let service = bootstrap::connect(&config).await?;

    for zone in Zone::ALL {
        let tickets = service.snapshot(zone).await?;
        let current = tickets
            .iter()
            .filter(|t| t.state == TicketState::Current)
            .count();

        tracing::info!(
            zone = %zone,
            active = tickets.len(),
            current,
            waiting = tickets.len() - current,
            next_position = ?tickets
                .iter()
                .filter(|t| t.state == TicketState::Waiting)
                .map(|t| t.position)
                .min(),
            "Zone snapshot"
        );
    }

    Ok(())
}
