use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;

use flowlink_core::cluster::LogConfig;
use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::Append;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::Handle;

use crate::utils::process::get_work_space;

const LOG_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} {level} [{thread}] {target} - {m}{n}";
const LOG_FILE_NAME: &str = "flowlink.log";

lazy_static! {
    static ref LOG_HANDLE: Mutex<Option<Handle>> = Mutex::new(None);
}

/// init log4rs, a second call replaces the config of the first one.
/// a `config_path` hands the whole setup to a log4rs yaml file
pub fn init_log(log_config: &LogConfig) -> anyhow::Result<()> {
    let mut handle = LOG_HANDLE
        .lock()
        .map_err(|e| anyhow!("log handle lock error. {}", e))?;

    if let Some(config_path) = &log_config.config_path {
        if handle.is_some() {
            warn!("logger already initialized, ignore `{}`", config_path);
            return Ok(());
        }
        log4rs::init_file(config_path, Default::default())?;
        return Ok(());
    }

    let config = build_config(log_config)?;
    match handle.as_ref() {
        Some(h) => h.set_config(config),
        None => {
            let h = log4rs::init_config(config)?;
            *handle = Some(h);
        }
    }

    Ok(())
}

fn build_config(log_config: &LogConfig) -> anyhow::Result<Config> {
    let level = LevelFilter::from_str(log_config.level.as_str())
        .map_err(|e| anyhow!("can not parse log level `{}`. {}", log_config.level, e))?;

    let encoder = PatternEncoder::new(LOG_PATTERN);
    let (name, appender) = if log_config.console {
        ("console", create_console_appender(encoder))
    } else {
        let path = match &log_config.file_path {
            Some(path) => PathBuf::from(path),
            None => get_work_space()?.join(LOG_FILE_NAME),
        };
        ("rolling_file", create_rolling_file_appender(encoder, path)?)
    };

    let config = Config::builder()
        .appender(Appender::builder().build(name, appender))
        .build(Root::builder().appender(name).build(level))?;
    Ok(config)
}

fn create_console_appender(encoder: PatternEncoder) -> Box<dyn Append> {
    let stdout = ConsoleAppender::builder()
        .target(Target::Stdout)
        .encoder(Box::new(encoder))
        .build();
    Box::new(stdout)
}

fn create_rolling_file_appender(
    encoder: PatternEncoder,
    path: PathBuf,
) -> anyhow::Result<Box<dyn Append>> {
    let roll_path = format!("{}.{{}}", path.to_string_lossy());

    let trigger = SizeTrigger::new(50 * 1024 * 1024);
    let roll = FixedWindowRoller::builder()
        .base(1)
        .build(roll_path.as_str(), 20)?;
    let policy = CompoundPolicy::new(Box::new(trigger), Box::new(roll));

    let rolling_file = RollingFileAppender::builder()
        .encoder(Box::new(encoder))
        .append(true)
        .build(path, Box::new(policy))?;
    Ok(Box::new(rolling_file))
}

#[cfg(test)]
mod tests {
    use flowlink_core::cluster::LogConfig;

    use crate::logger::{build_config, init_log};

    #[test]
    pub fn build_config_test() {
        let mut log_config = LogConfig::default();
        log_config.level = "debug".to_string();
        assert!(build_config(&log_config).is_ok());

        log_config.level = "verbose".to_string();
        assert!(build_config(&log_config).is_err());
    }

    #[test]
    pub fn init_twice_test() {
        init_log(&LogConfig::default()).unwrap();
        init_log(&LogConfig::default()).unwrap();
        info!("logger initialized");
    }
}
