use std::io::{self, Read, Write};
use std::net::{IpAddr, Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::command::{line, masked_line, Command};
use crate::data_channel::{DataChannel, DataConnectError};
use crate::frontend::{Frontend, LogSink};
use crate::hostport::parse_epsv_port;
use crate::reply::{MalformedReply, ReplyCode, ServerReply};
use crate::{HostPort, SessionConfig};

use anyhow::{Error, Result};
use strum_macros::Display;

const CRLF: &str = "\r\n";
const READ_UNIT: usize = 4096;
const QUIT_REPLY_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Display, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionMode {
    #[default]
    #[strum(serialize = "PASV")]
    Passive,
    #[strum(serialize = "EPSV")]
    ExtendedPassive,
    #[strum(serialize = "PORT")]
    Active,
    #[strum(serialize = "EPRT")]
    ExtendedActive,
}

#[derive(Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    AwaitingBanner,
    LoggingIn,
    Ready,
    Closing,
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Could not connect to {addr}: {reason}")]
    Connect { addr: String, reason: String },
    #[error("A password is required for account.")]
    CredentialsRequired,
    #[error("Session terminated: {0}")]
    Terminated(String),
    #[error("Not connected.")]
    NotConnected,
}

struct ControlStream {
    stream: TcpStream,
}

impl ControlStream {
    fn new(stream: TcpStream) -> ControlStream {
        ControlStream { stream }
    }

    fn send_line(&mut self, msg: &str) -> io::Result<()> {
        self.stream.write_all(format!("{}{}", msg, CRLF).as_bytes())
    }

    fn read_chunk(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = [0_u8; READ_UNIT];
        loop {
            match self.stream.read(&mut buf) {
                Ok(n) => return Ok(buf[..n].to_vec()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

pub struct Session {
    config: SessionConfig,
    control: Option<ControlStream>,
    state: SessionState,
    host: Option<String>,
    port: u16,
    logged_in: bool,
    verbose: bool,
    mode: ConnectionMode,
    frontend: Box<dyn Frontend>,
    log: Box<dyn LogSink>,
}

impl Session {
    pub fn new(config: SessionConfig, frontend: Box<dyn Frontend>, log: Box<dyn LogSink>) -> Session {
        Session {
            verbose: config.verbose,
            mode: config.mode,
            config,
            control: None,
            state: SessionState::Disconnected,
            host: None,
            port: 0,
            logged_in: false,
            frontend,
            log,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.control.is_some()
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn mode(&self) -> ConnectionMode {
        self.mode
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn frontend(&mut self) -> &mut dyn Frontend {
        self.frontend.as_mut()
    }

    pub fn display(&mut self, text: &str) {
        self.frontend.display(text);
    }

    fn log_line(&mut self, text: &str) {
        self.log.log_line(text);
    }

    pub fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        if self.control.is_some() {
            self.close();
        }
        self.state = SessionState::Connecting;
        self.logged_in = false;
        self.log_line(&format!("Connecting to {}:{}.", host, port));

        let connected = (host, port)
            .to_socket_addrs()
            .and_then(|addrs| self.connect_any(addrs.collect()));
        let stream = match connected {
            Ok(stream) => stream,
            Err(e) => {
                self.state = SessionState::Closed;
                self.log_line(&format!("Could not connect to {}:{}: {}", host, port, e));
                return Err(Error::new(SessionError::Connect {
                    addr: format!("{}:{}", host, port),
                    reason: e.to_string(),
                }));
            }
        };
        log::info!("Control connection open to {:?}", stream.peer_addr());
        self.control = Some(ControlStream::new(stream));
        self.host = Some(host.to_owned());
        self.port = port;
        self.state = SessionState::AwaitingBanner;
        Ok(())
    }

    fn connect_any(&self, addrs: Vec<SocketAddr>) -> io::Result<TcpStream> {
        let mut last_error = io::Error::new(io::ErrorKind::NotFound, "host name did not resolve");
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.config.connect_timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    log::debug!("Connecting to {} failed: {}", addr, e);
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    pub fn await_ready(&mut self) -> Result<ServerReply> {
        loop {
            if let Some(reply) = self.get_reply()? {
                if reply.is(ReplyCode::ServiceReady)
                    || reply.contains_line_with_code(ReplyCode::ServiceReady.code())
                {
                    self.state = SessionState::LoggingIn;
                    return Ok(reply);
                }
                log::info!("Still waiting for service ready, got {}", reply.code);
            }
        }
    }

    pub fn login(&mut self, user: &str, password: Option<&str>) -> Result<ServerReply> {
        self.state = SessionState::LoggingIn;
        self.send(&Command::User(user.to_owned()))?;
        let mut reply = self.next_reply()?;
        if reply.is(ReplyCode::PasswordNeeded) {
            match password {
                Some(password) => {
                    self.send(&Command::Pass(password.to_owned()))?;
                    reply = self.next_reply()?;
                }
                None => {
                    self.log_line("A password is required for account.");
                    self.close();
                    return Err(Error::new(SessionError::CredentialsRequired));
                }
            }
        }
        if reply.is(ReplyCode::UserLoggedIn) {
            self.logged_in = true;
            self.state = SessionState::Ready;
        }
        Ok(reply)
    }

    pub fn send_command(&mut self, verb: &str, value: &str) -> Result<()> {
        let transcript = masked_line(verb, value);
        self.log_line(&format!("Sent: {}", transcript));
        log::debug!("----> {}", transcript);
        let control = self.control.as_mut().ok_or(SessionError::NotConnected)?;
        match control.send_line(&line(verb, value)) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.terminate(e.to_string())),
        }
    }

    fn send(&mut self, command: &Command) -> Result<()> {
        self.send_command(&command.to_string(), &command.argument())
    }

    pub fn get_reply(&mut self) -> Result<Option<ServerReply>> {
        let control = self.control.as_mut().ok_or(SessionError::NotConnected)?;
        let raw = match control.read_chunk() {
            Ok(raw) if raw.is_empty() => {
                return Err(self.terminate("connection closed by server".to_owned()))
            }
            Ok(raw) => raw,
            Err(e) => return Err(self.terminate(e.to_string())),
        };
        match ServerReply::parse(&raw) {
            Ok(reply) => {
                self.log_line(&format!("Received: {}", reply));
                log::debug!("<---- {}", reply);
                if self.verbose {
                    self.display(&reply.to_string());
                }
                if reply.is(ReplyCode::ServiceNotAvailable) {
                    self.display(&format!("Connection closing: {}", reply.message));
                }
                Ok(Some(reply))
            }
            Err(err) => {
                self.bad_reply(err);
                Ok(None)
            }
        }
    }

    fn bad_reply(&mut self, err: MalformedReply) {
        log::warn!("{}", err);
        self.log_line(&format!("Received unrecognized reply: {:?}", err.raw));
        self.display("Unrecognized server reply ignored.");
    }

    fn next_reply(&mut self) -> Result<ServerReply> {
        loop {
            if let Some(reply) = self.get_reply()? {
                return Ok(reply);
            }
        }
    }

    fn terminate(&mut self, reason: String) -> Error {
        log::error!("Control connection lost: {}", reason);
        self.log_line(&format!("Connection lost: {}", reason));
        if let Some(control) = self.control.take() {
            let _ = control.stream.shutdown(Shutdown::Both);
        }
        self.logged_in = false;
        self.state = SessionState::Closed;
        Error::new(SessionError::Terminated(reason))
    }

    pub fn toggle_mode(&mut self, mode: ConnectionMode) -> bool {
        if self.mode == mode {
            self.display(&format!("{} mode already enabled.", mode));
            return false;
        }
        self.mode = mode;
        self.display(&format!("{} mode enabled.", mode));
        true
    }

    pub fn open_data_connection(&mut self) -> Result<DataChannel> {
        let mut channel = DataChannel::new(self.config.accept_timeout, self.config.data_ports.clone());
        match self.mode {
            ConnectionMode::Passive => {
                self.send(&Command::Pasv)?;
                let reply = self.next_reply()?;
                if reply.is(ReplyCode::NotImplemented) {
                    return Err(Error::new(DataConnectError::Disabled("PASV")));
                }
                let host_port = HostPort::from_pasv_message(&reply.message)
                    .map_err(|_| DataConnectError::BadAddress(reply.to_string()))?;
                channel.connect(host_port.socket_addr(), self.config.connect_timeout)?;
            }
            ConnectionMode::ExtendedPassive => {
                self.send(&Command::Epsv)?;
                let reply = self.next_reply()?;
                if reply.is(ReplyCode::NotImplemented) {
                    return Err(Error::new(DataConnectError::Disabled("EPSV")));
                }
                let port = parse_epsv_port(&reply.message)
                    .map_err(|_| DataConnectError::BadAddress(reply.to_string()))?;
                let addr = SocketAddr::new(self.server_ip()?, port);
                channel.connect(addr, self.config.connect_timeout)?;
            }
            ConnectionMode::Active => {
                let ip = match self.local_ip()? {
                    IpAddr::V4(ip) => ip,
                    IpAddr::V6(_) => return Err(Error::new(DataConnectError::RequiresIpv4("PORT"))),
                };
                let port = channel.bind(IpAddr::V4(ip))?;
                channel.listen()?;
                self.send(&Command::Port(HostPort::new(ip, port)))?;
                self.expect_data_command_ok("PORT")?;
            }
            ConnectionMode::ExtendedActive => {
                let ip = self.local_ip()?;
                let port = channel.bind(ip)?;
                channel.listen()?;
                self.send(&Command::Eprt(SocketAddr::new(ip, port)))?;
                self.expect_data_command_ok("EPRT")?;
            }
        }
        Ok(channel)
    }

    fn expect_data_command_ok(&mut self, command: &'static str) -> Result<()> {
        let reply = self.next_reply()?;
        if reply.is(ReplyCode::NotImplemented) {
            return Err(Error::new(DataConnectError::Disabled(command)));
        }
        if !(200..300).contains(&reply.code) {
            return Err(Error::new(DataConnectError::Rejected {
                command,
                reply: reply.to_string(),
            }));
        }
        Ok(())
    }

    fn server_ip(&self) -> Result<IpAddr> {
        let control = self.control.as_ref().ok_or(SessionError::NotConnected)?;
        Ok(control.stream.peer_addr()?.ip())
    }

    fn local_ip(&self) -> Result<IpAddr> {
        let control = self.control.as_ref().ok_or(SessionError::NotConnected)?;
        Ok(control.stream.local_addr()?.ip())
    }

    // None when the server refused the command.
    fn transfer(&mut self, command: Command, upload: Option<&[u8]>) -> Result<Option<Vec<u8>>> {
        let mut channel = self.open_data_connection()?;
        self.send(&command)?;
        let reply = self.next_reply()?;
        if !reply.starts_transfer() {
            channel.close();
            if !self.verbose {
                self.display(&reply.to_string());
            }
            return Ok(None);
        }
        if !channel.accept() {
            channel.close();
            // The server still answers the command once it gives up on us.
            if !reply.completes_transfer() {
                let failed = self.next_reply()?;
                log::info!("Transfer abandoned by server: {}", failed);
            }
            return Err(Error::new(DataConnectError::AcceptTimeout(channel.accept_timeout())));
        }

        let moved = match upload {
            Some(data) => channel.send_file(data).map(|_| Vec::new()),
            None => channel.receive_all(),
        };
        channel.close();

        if !reply.completes_transfer() {
            let done = self.next_reply()?;
            if !self.verbose && !done.is(ReplyCode::ClosingDataConnection) {
                self.display(&done.to_string());
            }
        }
        let payload = moved.map_err(DataConnectError::Transfer)?;
        self.state = SessionState::Ready;
        Ok(Some(payload))
    }

    pub fn list(&mut self, path: &str) -> Result<()> {
        if let Some(listing) = self.transfer(Command::List(path.to_owned()), None)? {
            let listing = String::from_utf8_lossy(&listing);
            self.display(listing.trim_end());
        }
        Ok(())
    }

    pub fn retr(&mut self, remote: &str, local: &str) -> Result<()> {
        if let Some(data) = self.transfer(Command::Retr(remote.to_owned()), None)? {
            self.frontend.write_local_file(local, &data)?;
            self.display(&format!("{} bytes received into {}.", data.len(), local));
        }
        Ok(())
    }

    pub fn stor(&mut self, local: &str, remote: &str) -> Result<()> {
        let data = self.frontend.read_local_file(local)?;
        if self.transfer(Command::Stor(remote.to_owned()), Some(&data))?.is_some() {
            self.display(&format!("{} bytes sent to {}.", data.len(), remote));
        }
        Ok(())
    }

    fn simple_command(&mut self, command: Command) -> Result<ServerReply> {
        self.send(&command)?;
        let reply = self.next_reply()?;
        if self.logged_in {
            self.state = SessionState::Ready;
        }
        Ok(reply)
    }

    pub fn cwd(&mut self, path: &str) -> Result<ServerReply> {
        let reply = self.simple_command(Command::Cwd(path.to_owned()))?;
        if !self.verbose {
            self.display(&reply.to_string());
        }
        Ok(reply)
    }

    pub fn pwd(&mut self) -> Result<ServerReply> {
        let reply = self.simple_command(Command::Pwd)?;
        if !self.verbose {
            match quoted_path(&reply) {
                Some(path) => self.display(path),
                None => self.display(&reply.to_string()),
            }
        }
        Ok(reply)
    }

    pub fn syst(&mut self) -> Result<ServerReply> {
        let reply = self.simple_command(Command::Syst)?;
        if !self.verbose {
            self.display(&reply.to_string());
        }
        Ok(reply)
    }

    pub fn remote_help(&mut self, topic: &str) -> Result<ServerReply> {
        let reply = self.simple_command(Command::Help(topic.to_owned()))?;
        if !self.verbose {
            self.display(&reply.to_string());
        }
        Ok(reply)
    }

    pub fn close(&mut self) {
        let mut control = match self.control.take() {
            Some(control) => control,
            None => return,
        };
        self.state = SessionState::Closing;
        self.log_line(&format!("Sent: {}", Command::Quit));
        if control.send_line(&Command::Quit.to_string()).is_ok() {
            let _ = control.stream.set_read_timeout(Some(QUIT_REPLY_TIMEOUT));
            if let Ok(raw) = control.read_chunk() {
                if let Ok(reply) = ServerReply::parse(&raw) {
                    self.log_line(&format!("Received: {}", reply));
                    if self.verbose {
                        self.display(&reply.to_string());
                    }
                }
            }
        }
        let _ = control.stream.shutdown(Shutdown::Both);
        self.logged_in = false;
        self.state = SessionState::Closed;
        log::info!("Session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

// `257 "/home/cs472" is the current directory` -> `/home/cs472`
fn quoted_path(reply: &ServerReply) -> Option<&str> {
    if !reply.is(ReplyCode::PathnameCreated) {
        return None;
    }
    let mut parts = reply.message.splitn(3, '"');
    parts.next()?;
    let path = parts.next()?;
    parts.next().map(|_| path)
}
