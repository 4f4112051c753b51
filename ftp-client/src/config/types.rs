use std::default::Default;

use ftp::{SessionConfig, DEFAULT_CONTROL_PORT};

use log::LevelFilter;

pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_file: String,
    pub user: Option<String>,
    pub session: SessionConfig,
    pub log: LogOpts,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: String::new(),
            port: DEFAULT_CONTROL_PORT,
            log_file: String::new(),
            user: None,
            session: SessionConfig::default(),
            log: LogOpts::default(),
        }
    }
}

impl Config {
    pub fn merge<C: ?Sized>(&mut self, changes: &C)
    where
        C: ConfigChanges,
    {
        changes.apply(self)
    }
}

pub trait ConfigChanges {
    fn apply(&self, config: &mut Config);
}

pub struct LogOpts {
    pub console: LevelFilter,
    pub file: LevelFilter,
}

impl Default for LogOpts {
    fn default() -> Self {
        LogOpts {
            console: LevelFilter::Warn,
            file: LevelFilter::Debug,
        }
    }
}
