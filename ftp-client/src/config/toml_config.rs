use std::convert::Into;
use std::str::FromStr;
use std::time::Duration;

use super::{Config, ConfigChanges};

use ftp::ConnectionMode;
use log::LevelFilter;
use serde::Deserialize;

#[derive(Deserialize)]
pub struct TomlConfig {
    session: Option<SessionOpts>,
    #[serde(rename(deserialize = "log"))]
    log_opts: Option<LogOpts>,
}

impl FromStr for TomlConfig {
    type Err = toml::de::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config = toml::from_str(s)?;
        Ok(config)
    }
}

impl ConfigChanges for TomlConfig {
    fn apply(&self, config: &mut Config) {
        if let Some(session) = &self.session {
            if let Some(timeout) = session.connect_timeout {
                config.session.connect_timeout = Duration::from_secs(timeout);
            }
            if let Some(timeout) = session.accept_timeout {
                config.session.accept_timeout = Duration::from_secs(timeout);
            }
            if let Some(mode) = session.mode.clone() {
                config.session.mode = mode.into();
            }
            if let Some(verbose) = session.verbose {
                config.session.verbose = verbose;
            }
            if let Some(min) = session.data_port_min {
                config.session.data_ports.start = min;
            }
            if let Some(max) = session.data_port_max {
                config.session.data_ports.end = max;
            }
            if let Some(user) = &session.user {
                config.user = Some(user.clone());
            }
        }
        if let Some(log_opts) = &self.log_opts {
            if let Some(level) = log_opts.console.clone() {
                config.log.console = level.into();
            }
            if let Some(level) = log_opts.file.clone() {
                config.log.file = level.into();
            }
        }
    }
}

#[derive(Deserialize)]
struct SessionOpts {
    connect_timeout: Option<u64>,
    accept_timeout: Option<u64>,
    mode: Option<Mode>,
    verbose: Option<bool>,
    data_port_min: Option<u16>,
    data_port_max: Option<u16>,
    user: Option<String>,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
enum Mode {
    #[serde(rename(deserialize = "pasv"))]
    Pasv,
    #[serde(rename(deserialize = "epsv"))]
    Epsv,
    #[serde(rename(deserialize = "port"))]
    Port,
    #[serde(rename(deserialize = "eprt"))]
    Eprt,
}

impl Into<ConnectionMode> for Mode {
    fn into(self) -> ConnectionMode {
        match self {
            Mode::Pasv => ConnectionMode::Passive,
            Mode::Epsv => ConnectionMode::ExtendedPassive,
            Mode::Port => ConnectionMode::Active,
            Mode::Eprt => ConnectionMode::ExtendedActive,
        }
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
enum LogLevel {
    #[serde(rename(deserialize = "off"))]
    Off,
    #[serde(rename(deserialize = "error"))]
    Error,
    #[serde(rename(deserialize = "warn"))]
    Warn,
    #[serde(rename(deserialize = "info"))]
    Info,
    #[serde(rename(deserialize = "debug"))]
    Debug,
    #[serde(rename(deserialize = "trace"))]
    Trace,
}

impl Into<LevelFilter> for LogLevel {
    fn into(self) -> LevelFilter {
        match self {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Deserialize)]
struct LogOpts {
    console: Option<LogLevel>,
    file: Option<LogLevel>,
}
