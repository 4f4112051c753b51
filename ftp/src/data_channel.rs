use std::io::{self, ErrorKind, Read, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rand::Rng;

const BUFFER_SIZE: usize = 4096;
const BIND_ATTEMPTS: usize = 64;
const WAKE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(thiserror::Error, Debug)]
pub enum DataConnectError {
    #[error("{0} disabled by server.")]
    Disabled(&'static str),
    #[error("{command} rejected by server: {reply}")]
    Rejected { command: &'static str, reply: String },
    #[error("Could not read data connection address from reply: {0}")]
    BadAddress(String),
    #[error("{0} needs an IPv4 control connection, try eprt instead.")]
    RequiresIpv4(&'static str),
    #[error("Could not open data connection to {addr}: {source}")]
    Connect { addr: SocketAddr, source: io::Error },
    #[error("Could not bind a data port: {0}")]
    Bind(io::Error),
    #[error("No free data port in {0:?}")]
    NoFreePort(Range<u16>),
    #[error("Server did not open the data connection within {0:?}.")]
    AcceptTimeout(Duration),
    #[error("Data transfer failed: {0}")]
    Transfer(io::Error),
}

pub struct DataChannel {
    endpoint: Endpoint,
    accept_timeout: Duration,
    ports: Range<u16>,
}

enum Endpoint {
    Idle,
    Listening {
        listener: TcpListener,
        pending: Option<PendingAccept>,
    },
    Connected(TcpStream),
}

struct PendingAccept {
    ready: Receiver<io::Result<TcpStream>>,
    cancelled: Arc<AtomicBool>,
    wake_addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl PendingAccept {
    fn spawn(listener: TcpListener, wake_addr: SocketAddr) -> PendingAccept {
        let (tx, ready) = mpsc::channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let handle = thread::spawn(move || {
            let accepted = listener.accept().map(|(stream, peer)| {
                log::debug!("Data connection accepted from {}", peer);
                stream
            });
            if !flag.load(Ordering::SeqCst) {
                let _ = tx.send(accepted);
            }
        });
        PendingAccept {
            ready,
            cancelled,
            wake_addr,
            handle,
        }
    }

    fn wait(self, timeout: Duration) -> Option<TcpStream> {
        match self.ready.recv_timeout(timeout) {
            Ok(Ok(stream)) => {
                let _ = self.handle.join();
                Some(stream)
            }
            Ok(Err(e)) => {
                log::warn!("Accepting data connection failed: {}", e);
                let _ = self.handle.join();
                None
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("No data connection within {:?}", timeout);
                self.cancel();
                None
            }
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    fn cancel(self) {
        self.cancelled.store(true, Ordering::SeqCst);
        // A blocked accept only returns once somebody connects.
        match TcpStream::connect_timeout(&self.wake_addr, WAKE_TIMEOUT) {
            Ok(_) => {
                let _ = self.handle.join();
            }
            Err(e) => log::debug!("Could not wake accept thread: {}", e),
        }
    }
}

impl DataChannel {
    pub fn new(accept_timeout: Duration, ports: Range<u16>) -> DataChannel {
        DataChannel {
            endpoint: Endpoint::Idle,
            accept_timeout,
            ports,
        }
    }

    pub fn connect(&mut self, addr: SocketAddr, timeout: Duration) -> Result<(), DataConnectError> {
        self.close();
        let stream = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|source| DataConnectError::Connect { addr, source })?;
        log::info!("Data connection open to {}", addr);
        self.endpoint = Endpoint::Connected(stream);
        Ok(())
    }

    pub fn bind(&mut self, ip: IpAddr) -> Result<u16, DataConnectError> {
        self.close();
        if self.ports.is_empty() {
            return Err(DataConnectError::NoFreePort(self.ports.clone()));
        }
        let mut rng = rand::thread_rng();
        for _ in 0..BIND_ATTEMPTS {
            let port = rng.gen_range(self.ports.clone());
            match TcpListener::bind((ip, port)) {
                Ok(listener) => {
                    log::info!("Data channel listening on {}:{}", ip, port);
                    self.endpoint = Endpoint::Listening {
                        listener,
                        pending: None,
                    };
                    return Ok(port);
                }
                Err(e) if e.kind() == ErrorKind::AddrInUse => {
                    log::debug!("Data port {} is taken", port);
                    continue;
                }
                Err(e) => return Err(DataConnectError::Bind(e)),
            }
        }
        Err(DataConnectError::NoFreePort(self.ports.clone()))
    }

    // Must run before the command that makes the server connect back.
    pub fn listen(&mut self) -> Result<(), DataConnectError> {
        match &mut self.endpoint {
            Endpoint::Listening { listener, pending } => {
                if pending.is_none() {
                    let addr = listener.local_addr().map_err(DataConnectError::Bind)?;
                    let accepting = listener.try_clone().map_err(DataConnectError::Bind)?;
                    *pending = Some(PendingAccept::spawn(accepting, wake_addr(addr)));
                }
                Ok(())
            }
            _ => Err(DataConnectError::Bind(io::Error::from(ErrorKind::NotConnected))),
        }
    }

    pub fn accept(&mut self) -> bool {
        let pending = match &mut self.endpoint {
            Endpoint::Connected(_) => return true,
            Endpoint::Listening { pending, .. } => pending.take(),
            Endpoint::Idle => None,
        };
        match pending.and_then(|pending| pending.wait(self.accept_timeout)) {
            Some(stream) => {
                self.endpoint = Endpoint::Connected(stream);
                true
            }
            None => false,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.endpoint, Endpoint::Connected(_))
    }

    pub fn accept_timeout(&self) -> Duration {
        self.accept_timeout
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.endpoint {
            Endpoint::Listening { listener, .. } => listener.local_addr().ok(),
            Endpoint::Connected(stream) => stream.local_addr().ok(),
            Endpoint::Idle => None,
        }
    }

    // Reads to EOF, a short read is not the end of the data.
    pub fn receive_all(&mut self) -> io::Result<Vec<u8>> {
        let stream = self.stream()?;
        let mut payload = Vec::new();
        let mut buf = [0; BUFFER_SIZE];
        loop {
            let n = match stream.read(&mut buf) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if n == 0 {
                break;
            }
            payload.extend_from_slice(&buf[..n]);
        }
        log::debug!("Received {} bytes on data connection", payload.len());
        Ok(payload)
    }

    pub fn send_file(&mut self, data: &[u8]) -> io::Result<()> {
        let stream = self.stream()?;
        stream.write_all(data)?;
        stream.flush()?;
        stream.shutdown(Shutdown::Write)?;
        log::debug!("Sent {} bytes on data connection", data.len());
        Ok(())
    }

    pub fn close(&mut self) {
        match std::mem::replace(&mut self.endpoint, Endpoint::Idle) {
            Endpoint::Idle => {}
            Endpoint::Listening { listener, pending } => {
                if let Some(pending) = pending {
                    pending.cancel();
                }
                drop(listener);
            }
            Endpoint::Connected(stream) => {
                let _ = stream.shutdown(Shutdown::Both);
            }
        }
    }

    fn stream(&mut self) -> io::Result<&mut TcpStream> {
        match &mut self.endpoint {
            Endpoint::Connected(stream) => Ok(stream),
            _ => Err(io::Error::from(ErrorKind::NotConnected)),
        }
    }
}

impl Drop for DataChannel {
    fn drop(&mut self) {
        self.close();
    }
}

fn wake_addr(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => SocketAddr::from((Ipv4Addr::LOCALHOST, addr.port())),
        IpAddr::V6(ip) if ip.is_unspecified() => SocketAddr::from((Ipv6Addr::LOCALHOST, addr.port())),
        _ => addr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn channel(timeout: Duration) -> DataChannel {
        DataChannel::new(timeout, 50000..60000)
    }

    #[test]
    fn test_bind_in_range() {
        let mut channel = channel(Duration::from_secs(1));
        let port = channel.bind(IpAddr::V4(Ipv4Addr::LOCALHOST)).unwrap();
        assert!((50000..60000).contains(&port));
        assert_eq!(channel.local_addr().unwrap().port(), port);
        assert!(!channel.is_connected());
    }

    #[test]
    fn test_listen_and_receive() {
        let mut channel = channel(Duration::from_secs(5));
        let port = channel.bind(IpAddr::V4(Ipv4Addr::LOCALHOST)).unwrap();
        channel.listen().unwrap();
        let server = thread::spawn(move || {
            let mut stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).unwrap();
            stream.write_all(b"drwxr-xr-x 2 ftp ftp 4096 docs\r\n").unwrap();
        });
        assert!(channel.accept());
        let payload = channel.receive_all().unwrap();
        assert_eq!(payload, b"drwxr-xr-x 2 ftp ftp 4096 docs\r\n");
        server.join().unwrap();
        channel.close();
        assert!(!channel.is_connected());
    }

    #[test]
    fn test_accept_timeout_leaves_channel_unconnected() {
        let mut channel = channel(Duration::from_millis(300));
        channel.bind(IpAddr::V4(Ipv4Addr::LOCALHOST)).unwrap();
        channel.listen().unwrap();
        let start = Instant::now();
        assert!(!channel.accept());
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(!channel.is_connected());
        assert!(channel.receive_all().is_err());
    }

    #[test]
    fn test_connect_and_send() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut data = Vec::new();
            stream.read_to_end(&mut data).unwrap();
            data
        });
        let mut channel = channel(Duration::from_secs(1));
        channel.connect(addr, Duration::from_secs(1)).unwrap();
        assert!(channel.is_connected());
        channel.send_file(b"random garbage people store in text files").unwrap();
        channel.close();
        assert_eq!(
            server.join().unwrap(),
            b"random garbage people store in text files"
        );
    }

    #[test]
    fn test_connect_refused() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let mut channel = channel(Duration::from_secs(1));
        let err = channel.connect(addr, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, DataConnectError::Connect { .. }));
    }
}
