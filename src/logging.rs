use crate::error::{ScheduleError, ScheduleResult};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::SubscriberBuilder;

pub fn init_tracing(level: Option<&str>) -> ScheduleResult<()> {
    let default_level = level.unwrap_or("info");
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|error| ScheduleError::InvalidConfig(format!("tracing subscriber: {error}")))?;

    Ok(())
}
