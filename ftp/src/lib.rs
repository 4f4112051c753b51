mod command;
mod config;
mod data_channel;
mod dispatcher;
mod frontend;
mod hostport;
mod reply;
mod session;

pub use command::Command;
pub use config::{SessionConfig, DEFAULT_CONTROL_PORT};
pub use data_channel::{DataChannel, DataConnectError};
pub use dispatcher::{Dispatcher, Flow, UsageError, UserCommand};
pub use frontend::{Frontend, LogFacade, LogSink};
pub use hostport::{eprt_argument, p1p2_to_port, parse_epsv_port, port_to_p1p2, HostPort};
pub use reply::{MalformedReply, ReplyCode, ServerReply};
pub use session::{ConnectionMode, Session, SessionError, SessionState};
