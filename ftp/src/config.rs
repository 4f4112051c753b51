use std::default::Default;
use std::ops::Range;
use std::time::Duration;

use crate::ConnectionMode;

pub const DEFAULT_CONTROL_PORT: u16 = 21;

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub connect_timeout: Duration,
    pub accept_timeout: Duration,
    pub data_ports: Range<u16>,
    pub mode: ConnectionMode,
    pub verbose: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            connect_timeout: Duration::from_secs(10),
            accept_timeout: Duration::from_secs(10),
            data_ports: 50000..60000,
            mode: ConnectionMode::default(),
            verbose: true,
        }
    }
}
