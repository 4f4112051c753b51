use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::sleep;
use std::time::Duration;

use ftp::HostPort;

use anyhow::{anyhow, Context, Result};

const CRLF: &str = "\r\n";

/// Knobs for the server's behaviour.
#[derive(Clone)]
pub struct ServerScript {
    /// Lines sent one by one before the 220 banner.
    pub greeting: Vec<String>,
    /// Verbs answered with 502.
    pub disabled: Vec<String>,
    /// When false, the server accepts PORT/EPRT but never connects back;
    /// it answers 425 after `decline_delay` instead.
    pub connect_back: bool,
    pub decline_delay: Duration,
    /// Fixed replies for chosen verbs, e.g. `("SYST", "421 Timeout.")`.
    pub canned: Vec<(String, String)>,
    /// Sends 150 and 226 in a single write after the data is on its way.
    pub combine_replies: bool,
    /// Drops the control connection right after this verb is received.
    pub hang_up_on: Option<String>,
}

impl Default for ServerScript {
    fn default() -> Self {
        ServerScript {
            greeting: Vec::new(),
            disabled: Vec::new(),
            connect_back: true,
            decline_delay: Duration::ZERO,
            canned: Vec::new(),
            combine_replies: false,
            hang_up_on: None,
        }
    }
}

enum DataEndpoint {
    None,
    Passive(TcpListener),
    Active(SocketAddr),
}

/// Single-connection FTP server following a `ServerScript`.
pub struct ScriptedServer {
    listener: TcpListener,
    root: PathBuf,
    cwd: String,
    script: ServerScript,
    received: Arc<Mutex<Vec<String>>>,
    data: DataEndpoint,
}

impl ScriptedServer {
    pub fn bind(
        root: PathBuf,
        script: ServerScript,
        received: Arc<Mutex<Vec<String>>>,
    ) -> Result<ScriptedServer> {
        Ok(ScriptedServer {
            listener: TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?,
            root,
            cwd: "/".to_owned(),
            script,
            received,
            data: DataEndpoint::None,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn serve_one(mut self) -> Result<()> {
        let (stream, peer) = self.listener.accept()?;
        log::info!("Scripted server got a connection from {}", peer);
        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = stream;

        for line in self.script.greeting.clone() {
            Self::send(&mut writer, &line)?;
            sleep(Duration::from_millis(50));
        }
        Self::send(&mut writer, "220 Scripted FTP server ready.")?;

        loop {
            let mut line = String::new();
            if reader.read_line(&mut line)? == 0 {
                log::info!("Client went away");
                return Ok(());
            }
            let line = line.trim_end_matches(CRLF).trim_end().to_owned();
            log::debug!("<---- {}", line);
            self.received.lock().unwrap().push(line.clone());

            let (verb, arg) = match line.split_once(' ') {
                Some((verb, arg)) => (verb.to_uppercase(), arg.to_owned()),
                None => (line.to_uppercase(), String::new()),
            };
            if self.script.hang_up_on.as_deref() == Some(verb.as_str()) {
                return Ok(());
            }
            if let Some((_, reply)) = self.script.canned.iter().find(|(canned, _)| *canned == verb) {
                Self::send(&mut writer, reply)?;
                continue;
            }
            if self.script.disabled.iter().any(|disabled| *disabled == verb) {
                Self::send(&mut writer, "502 Command not implemented.")?;
                continue;
            }
            if !self.dispatch(&verb, &arg, &mut writer)? {
                return Ok(());
            }
        }
    }

    fn send(writer: &mut TcpStream, msg: &str) -> Result<()> {
        log::debug!("----> {}", msg);
        // One write per reply, the client treats each read as a reply.
        writer.write_all(format!("{}{}", msg, CRLF).as_bytes())?;
        Ok(())
    }

    /// Returns false once the conversation is over.
    fn dispatch(&mut self, verb: &str, arg: &str, writer: &mut TcpStream) -> Result<bool> {
        match verb {
            "USER" => Self::send(writer, "331 Please specify the password.")?,
            "PASS" => {
                if arg == crate::PASSWORD {
                    Self::send(writer, "230 Login successful.")?
                } else {
                    Self::send(writer, "530 Login incorrect.")?
                }
            }
            "QUIT" => {
                Self::send(writer, "221 Goodbye.")?;
                return Ok(false);
            }
            "PWD" => Self::send(writer, &format!("257 \"{}\" is the current directory", self.cwd))?,
            "CWD" => {
                let target = self.resolve(arg);
                if target.is_dir() {
                    self.cwd = format!("/{}", arg.trim_matches('/'));
                    Self::send(writer, "250 Directory successfully changed.")?
                } else {
                    Self::send(writer, "550 Failed to change directory.")?
                }
            }
            "SYST" => Self::send(writer, "215 UNIX Type: L8")?,
            "HELP" => Self::send(writer, "214 The following commands are recognized.")?,
            "PASV" => {
                let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
                let host_port = HostPort::new(Ipv4Addr::LOCALHOST, listener.local_addr()?.port());
                self.data = DataEndpoint::Passive(listener);
                Self::send(writer, &format!("227 Entering Passive Mode ({}).", host_port))?
            }
            "EPSV" => {
                let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
                let port = listener.local_addr()?.port();
                self.data = DataEndpoint::Passive(listener);
                Self::send(writer, &format!("229 Entering Extended Passive Mode (|||{}|)", port))?
            }
            "PORT" => match arg.parse::<HostPort>() {
                Ok(host_port) => {
                    self.data = DataEndpoint::Active(host_port.socket_addr());
                    Self::send(writer, "200 PORT command successful.")?
                }
                Err(_) => Self::send(writer, "501 Illegal PORT command.")?,
            },
            "EPRT" => match parse_eprt(arg) {
                Ok(addr) => {
                    self.data = DataEndpoint::Active(addr);
                    Self::send(writer, "200 EPRT command successful.")?
                }
                Err(_) => Self::send(writer, "501 Illegal EPRT command.")?,
            },
            "LIST" => {
                let listing = self.listing()?;
                self.transfer(writer, Outgoing::Send(listing))?
            }
            "RETR" => match fs::read(self.resolve(arg)) {
                Ok(contents) => self.transfer(writer, Outgoing::Send(contents))?,
                Err(_) => Self::send(writer, "550 Failed to open file.")?,
            },
            "STOR" => {
                let path = self.resolve(arg);
                self.transfer(writer, Outgoing::Receive(path))?
            }
            _ => Self::send(writer, "500 Unknown command.")?,
        }
        Ok(true)
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = path.trim_start_matches('/');
        self.root.join(self.cwd.trim_start_matches('/')).join(path)
    }

    fn listing(&self) -> Result<Vec<u8>> {
        let mut names: Vec<String> = fs::read_dir(self.resolve(""))?
            .map(|entry| entry.map(|entry| entry.file_name().to_string_lossy().into_owned()))
            .collect::<std::io::Result<_>>()?;
        names.sort();
        let mut listing = String::new();
        for name in names {
            listing += &format!("-rw-r--r-- 1 ftp ftp 0 Jan 01 00:00 {}{}", name, CRLF);
        }
        Ok(listing.into_bytes())
    }

    fn open_data(&mut self) -> Result<Option<TcpStream>> {
        match std::mem::replace(&mut self.data, DataEndpoint::None) {
            DataEndpoint::None => Err(anyhow!("no data endpoint")),
            DataEndpoint::Passive(listener) => Ok(Some(listener.accept()?.0)),
            DataEndpoint::Active(addr) => {
                if !self.script.connect_back {
                    log::info!("Not connecting back to {}", addr);
                    return Ok(None);
                }
                let stream = TcpStream::connect(addr)
                    .with_context(|| format!("connecting back to {}", addr))?;
                Ok(Some(stream))
            }
        }
    }

    fn transfer(&mut self, writer: &mut TcpStream, outgoing: Outgoing) -> Result<()> {
        if matches!(self.data, DataEndpoint::None) {
            return Self::send(writer, "425 Use PORT or PASV first.");
        }
        if !self.script.combine_replies {
            Self::send(writer, "150 Here comes the data.")?;
        }
        let mut stream = match self.open_data()? {
            Some(stream) => stream,
            None => {
                sleep(self.script.decline_delay);
                return Self::send(writer, "425 Failed to establish connection.");
            }
        };
        match outgoing {
            Outgoing::Send(contents) => {
                stream.write_all(&contents)?;
            }
            Outgoing::Receive(path) => {
                let mut contents = Vec::new();
                stream.read_to_end(&mut contents)?;
                fs::write(path, contents)?;
            }
        }
        drop(stream);
        if self.script.combine_replies {
            let combined = format!("150 Here comes the data.{}226 Transfer complete.", CRLF);
            Self::send(writer, &combined)
        } else {
            Self::send(writer, "226 Transfer complete.")
        }
    }
}

enum Outgoing {
    Send(Vec<u8>),
    Receive(PathBuf),
}

fn parse_eprt(arg: &str) -> Result<SocketAddr> {
    let fields: Vec<&str> = arg.split('|').collect();
    if fields.len() != 5 {
        return Err(anyhow!("bad EPRT argument {}", arg));
    }
    let ip: IpAddr = fields[2].parse()?;
    let port: u16 = fields[3].parse()?;
    Ok(SocketAddr::new(ip, port))
}
