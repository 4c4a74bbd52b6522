use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::Append;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::utils::get_work_space;

const PATTERN: &'static str = "{d(%Y-%m-%d %H:%M:%S%.3f)} {level} [{thread}] {target} - {m}{n}";

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LogTarget {
    Console,
    /// Size-rolled file; a relative path resolves against the working directory.
    RollingFile(PathBuf),
}

/// level value: ["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"], ignore ascii case
pub fn parse_level(level: &str) -> anyhow::Result<LevelFilter> {
    LevelFilter::from_str(level).map_err(|_| anyhow!("can not parse log level `{}`", level))
}

/// init log4rs for the process, fails if a logger is already installed
pub fn init_log(target: &LogTarget, level: &str) -> anyhow::Result<()> {
    let config = build_config(target, level)?;
    log4rs::init_config(config)?;
    Ok(())
}

pub(crate) fn build_config(target: &LogTarget, level: &str) -> anyhow::Result<Config> {
    let default_level = parse_level(level)?;
    let encoder = PatternEncoder::new(PATTERN);

    let (name, appender) = match target {
        LogTarget::Console => ("console", create_console_appender(encoder)),
        LogTarget::RollingFile(path) => (
            "rolling_file",
            create_rolling_file_appender(path.as_path(), encoder)?,
        ),
    };

    let config = Config::builder()
        .appender(Appender::builder().build(name, appender))
        .build(Root::builder().appender(name).build(default_level))?;
    Ok(config)
}

fn create_console_appender(encoder: PatternEncoder) -> Box<dyn Append> {
    let stdout = ConsoleAppender::builder()
        .target(Target::Stdout)
        .encoder(Box::new(encoder))
        .build();
    let appender: Box<dyn Append> = Box::new(stdout);
    appender
}

fn create_rolling_file_appender(
    path: &Path,
    encoder: PatternEncoder,
) -> anyhow::Result<Box<dyn Append>> {
    let path = if path.is_relative() {
        get_work_space()?.join(path)
    } else {
        path.to_path_buf()
    };
    let roll_path = path
        .to_str()
        .ok_or_else(|| anyhow!("log path is not valid unicode: {:?}", path))?
        .to_string()
        + ".{}";

    let trigger = SizeTrigger::new(50 * 1024 * 1024);

    let roll = FixedWindowRoller::builder()
        .base(1)
        .build(roll_path.as_str(), 20)?;

    let policy = CompoundPolicy::new(Box::new(trigger), Box::new(roll));

    let rolling_file = RollingFileAppender::builder()
        .encoder(Box::new(encoder))
        .append(true)
        .build(path, Box::new(policy))?;
    let appender: Box<dyn Append> = Box::new(rolling_file);
    Ok(appender)
}

#[cfg(test)]
mod tests {
    use log::LevelFilter;

    use crate::runtime::logger::{build_config, parse_level, LogTarget};

    #[test]
    pub fn parse_level_test() {
        assert_eq!(parse_level("debug").unwrap(), LevelFilter::Debug);
        assert_eq!(parse_level("WARN").unwrap(), LevelFilter::Warn);
        assert_eq!(parse_level("off").unwrap(), LevelFilter::Off);
        assert!(parse_level("verbose").is_err());
    }

    #[test]
    pub fn console_config_test() {
        let config = build_config(&LogTarget::Console, "info").unwrap();
        assert_eq!(config.appenders().len(), 1);
        assert_eq!(config.root().level(), LevelFilter::Info);
        assert!(build_config(&LogTarget::Console, "loud").is_err());
    }
}
