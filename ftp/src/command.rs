use std::net::SocketAddr;

use crate::hostport::eprt_argument;
use crate::HostPort;

#[derive(strum_macros::Display, Debug, Clone, PartialEq)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Command {
    User(String),
    Pass(String),
    Quit,
    Cwd(String),
    Pwd,
    List(String),
    Retr(String),
    Stor(String),
    Syst,
    Help(String),
    Pasv,
    Epsv,
    Port(HostPort),
    Eprt(SocketAddr),
}

impl Command {
    pub fn argument(&self) -> String {
        use Command::*;

        match self {
            User(arg) | Pass(arg) | Cwd(arg) | List(arg) | Retr(arg) | Stor(arg) | Help(arg) => {
                arg.clone()
            }
            Port(host_port) => host_port.to_string(),
            Eprt(addr) => eprt_argument(*addr),
            Quit | Pwd | Syst | Pasv | Epsv => String::new(),
        }
    }
}

pub(crate) fn masked_line(verb: &str, value: &str) -> String {
    if verb.eq_ignore_ascii_case("PASS") {
        line(verb, "****")
    } else {
        line(verb, value)
    }
}

pub(crate) fn line(verb: &str, value: &str) -> String {
    if value.is_empty() {
        verb.to_owned()
    } else {
        format!("{} {}", verb, value)
    }
}
