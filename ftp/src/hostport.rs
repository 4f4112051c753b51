use std::fmt::{Display, Formatter};
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;

use fallible_iterator::FallibleIterator;

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct HostPort {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl HostPort {
    pub fn new(ip: Ipv4Addr, port: u16) -> HostPort {
        HostPort { ip, port }
    }

    pub fn from_pasv_message(message: &str) -> Result<HostPort, ParseHostPortError> {
        let start = message.find('(').ok_or(ParseHostPortError {})?;
        let end = message[start..].find(')').ok_or(ParseHostPortError {})? + start;
        message[start + 1..end].trim().parse()
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.ip, self.port))
    }
}

pub fn port_to_p1p2(port: u16) -> (u8, u8) {
    ((port / 256) as u8, (port % 256) as u8)
}

pub fn p1p2_to_port(p1: u8, p2: u8) -> u16 {
    p1 as u16 * 256 + p2 as u16
}

#[derive(thiserror::Error, Debug)]
#[error("Could not parse hostport address")]
pub struct ParseHostPortError {}

impl FromStr for HostPort {
    type Err = ParseHostPortError;
    fn from_str(s: &str) -> Result<HostPort, ParseHostPortError> {
        let nums: Vec<u8> =
            fallible_iterator::convert(s.split(',').map(|c| c.trim().parse::<u8>()))
                .collect()
                .map_err(|_| ParseHostPortError {})?;
        if nums.len() != 6 {
            return Err(ParseHostPortError {});
        }
        let ip = Ipv4Addr::new(nums[0], nums[1], nums[2], nums[3]);
        let port = p1p2_to_port(nums[4], nums[5]);
        Ok(HostPort { ip, port })
    }
}

impl Display for HostPort {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let ip = self.ip.octets();
        let (p1, p2) = port_to_p1p2(self.port);
        write!(f, "{},{},{},{},{},{}", ip[0], ip[1], ip[2], ip[3], p1, p2)
    }
}

// The first character inside the parentheses is the delimiter; the port is the fourth field.
pub fn parse_epsv_port(message: &str) -> Result<u16, ParseHostPortError> {
    let start = message.find('(').ok_or(ParseHostPortError {})? + 1;
    let payload = &message[start..];
    let delimiter = payload.chars().next().ok_or(ParseHostPortError {})?;
    payload
        .split(delimiter)
        .nth(3)
        .ok_or(ParseHostPortError {})?
        .trim()
        .parse::<u16>()
        .map_err(|_| ParseHostPortError {})
}

pub fn eprt_argument(addr: SocketAddr) -> String {
    let net_proto = match addr {
        SocketAddr::V4(_) => 1,
        SocketAddr::V6(_) => 2,
    };
    format!("|{}|{}|{}|", net_proto, addr.ip(), addr.port())
}
