/// log4rs setup for processes embedding the store
///
use anyhow::Result;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::config::Config;

pub const LOG_PATTERN: &str = "{d(%Y-%m-%dT%H:%M:%S%.3f)} {h({l})} {T} {t} - {m}{n}";

/// initialize the global logger from the configured yaml file, or a console
/// appender at the configured level when no file is named.
pub fn init(config: &Config) -> Result<()> {
    if let Some(path) = &config.log_config {
        log4rs::init_file(path, Default::default())?;
        return Ok(());
    }

    log4rs::init_config(console_config(config)?)?;

    Ok(())
}

pub fn console_config(config: &Config) -> Result<log4rs::Config> {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build();

    let cfg = log4rs::Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(config.log_level))?;

    Ok(cfg)
}
