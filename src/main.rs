use std::sync::Arc;

use silakan_reminders::{
    appsettings::AppSettings,
    dispatch::{BatchDispatcher, LogDeliveryChannel},
    scheduling::ZonedClock,
    storage::InMemoryReminderStorage,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    pretty_env_logger::init();

    let settings = AppSettings::load()?;
    let timezone = settings.scheduler.timezone()?;
    log::info!("Starting SILAKAN reminder dispatcher in {}", timezone);

    let storage = Arc::new(InMemoryReminderStorage::from_records(settings.reminders));
    let dispatcher = BatchDispatcher::new(
        storage,
        Arc::new(LogDeliveryChannel),
        Arc::new(ZonedClock::new(timezone)),
    );

    let cancellation_token = CancellationToken::new();
    let shutdown = cancellation_token.clone();
    tokio::spawn(async move {
        if let Err(error) = tokio::signal::ctrl_c().await {
            log::error!("Could not listen for shutdown signal: {}", error);
        }
        shutdown.cancel();
    });

    dispatcher
        .run(settings.scheduler.batch_interval(), cancellation_token)
        .await;

    Ok(())
}
