use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::config::LoggingConfig;

/// Build the target filter described by the logging configuration.
pub fn targets(config: &LoggingConfig) -> Targets {
    let mut targets = Targets::new().with_default(LevelFilter::from(config.level));
    for (target, level) in &config.overrides {
        targets = targets.with_target(target.clone(), LevelFilter::from(*level));
    }
    targets
}

/// Install the global tracing subscriber.
pub fn init(config: &LoggingConfig) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(targets(config))
        .init();
}
