use cab_fleet::config::load_default_config;
use cab_fleet::core::report::{dashboard_summary, generate_fleet_report};
use cab_fleet::{Fleet, Result};
use chrono::Utc;
use dotenvy::dotenv;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();

    // 3. Load fleet configuration
    let config = load_default_config()
        .inspect_err(|e| error!("Failed to load fleet configuration: {}", e))?;

    // 4. Open the document store
    let fleet = Fleet::connect(config)
        .await
        .inspect(|_| info!("Fleet store opened."))
        .inspect_err(|e| error!("Failed to open fleet store: {}", e))?;

    // 5. Print today's dashboard and the default report
    let now = Utc::now();
    let dashboard = dashboard_summary(&fleet, now).await?;
    info!(
        total_cabs = dashboard.total_cabs,
        active_cabs = dashboard.active_cabs,
        today_trips = dashboard.today_trips,
        today_earnings = dashboard.today_earnings,
        today_expenses = dashboard.today_expenses,
        net_profit = dashboard.net_profit,
        "Dashboard"
    );

    let report = generate_fleet_report(&fleet, None, now, None).await?;
    info!(
        range = %report.range,
        trips = report.trips.total_trips,
        earnings = report.trips.total_earnings,
        expenses = report.expenses.total_expenses,
        net_profit = report.summary.net_profit,
        completion_rate = report.summary.completion_rate,
        "Fleet report"
    );

    Ok(())
}
