use calendarlink::startup;
use tracing::info;

#[tokio::main]
async fn main() -> miette::Result<()> {
    // Initialize logging
    startup::init_logging()?;

    info!("Starting calendarlink");

    // Load configuration
    let config = startup::load_config().await?;

    startup::start_service(config).await
}
