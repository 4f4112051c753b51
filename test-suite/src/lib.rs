mod server;

#[cfg(test)]
mod test_authorization;
#[cfg(test)]
mod test_basic_commands;
#[cfg(test)]
mod test_data_connection;

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::{Arc, Mutex, Once};
use std::thread::{self, JoinHandle};

use ftp::{Frontend, LogSink, Session, SessionConfig};

pub use server::{ScriptedServer, ServerScript};

use simplelog::*;
use tempdir::TempDir;

pub const USERNAME: &str = "cs472";
pub const PASSWORD: &str = "hw2ftp";

static INIT_LOG: Once = Once::new();

fn initialize_logger() {
    CombinedLogger::init(vec![
        TermLogger::new(
            LevelFilter::Warn,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(
            LevelFilter::Debug,
            Config::default(),
            File::create("test.log").unwrap(),
        ),
    ])
    .unwrap();
}

/// A scripted server on loopback with its own root directory, plus a
/// scratch directory standing in for the client's local disk.
pub struct TestEnvironment {
    pub dir: TempDir,
    pub local: TempDir,
    pub server_addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    server: Option<JoinHandle<()>>,
}

#[allow(dead_code)]
impl TestEnvironment {
    pub fn new() -> TestEnvironment {
        Self::with_script(ServerScript::default())
    }

    pub fn with_script(script: ServerScript) -> TestEnvironment {
        INIT_LOG.call_once(initialize_logger);
        let dir = TempDir::new("ftp-server-root").unwrap();
        let local = TempDir::new("ftp-client-local").unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let server = ScriptedServer::bind(dir.path().to_path_buf(), script, Arc::clone(&received))
            .unwrap();
        let server_addr = server.addr().unwrap();
        let server = thread::spawn(move || {
            if let Err(e) = server.serve_one() {
                log::error!("Scripted server failed: {:?}", e);
            }
        });
        TestEnvironment {
            dir,
            local,
            server_addr,
            received,
            server: Some(server),
        }
    }

    pub fn create_file(&self, path: &str, contents: &[u8]) {
        let mut file = File::create(self.dir.path().join(path)).unwrap();
        file.write_all(contents).unwrap();
    }

    pub fn create_dir(&self, path: &str) {
        fs::create_dir(self.dir.path().join(path)).unwrap();
    }

    pub fn create_local_file(&self, path: &str, contents: &[u8]) {
        fs::write(self.local.path().join(path), contents).unwrap();
    }

    pub fn server_file(&self, path: &str) -> Vec<u8> {
        fs::read(self.dir.path().join(path)).unwrap()
    }

    pub fn local_file(&self, path: &str) -> Vec<u8> {
        fs::read(self.local.path().join(path)).unwrap()
    }

    /// Every command line the server has read so far.
    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    pub fn received_verbs(&self) -> Vec<String> {
        self.received()
            .iter()
            .map(|line| line.split(' ').next().unwrap_or_default().to_owned())
            .collect()
    }

    pub fn session(&self, config: SessionConfig) -> (Session, Console) {
        let console = Console::new(self.local.path().to_path_buf());
        let session = Session::new(config, Box::new(console.clone()), Box::new(console.clone()));
        (session, console)
    }

    pub fn connected_session(&self, config: SessionConfig) -> (Session, Console) {
        let (mut session, console) = self.session(config);
        session.connect("127.0.0.1", self.server_addr.port()).unwrap();
        session.await_ready().unwrap();
        (session, console)
    }

    pub fn logged_in_session(&self, config: SessionConfig) -> (Session, Console) {
        let (mut session, console) = self.connected_session(config);
        let reply = session.login(USERNAME, Some(PASSWORD)).unwrap();
        assert_eq!(reply.code, 230);
        (session, console)
    }

    /// Waits for the server thread to finish its conversation.
    pub fn finish(&mut self) {
        if let Some(server) = self.server.take() {
            server.join().unwrap();
        }
    }
}

/// Terminal stand-in: scripted answers, captured output and transcript, and
/// local files kept in a scratch directory.
#[derive(Clone)]
pub struct Console {
    pub answers: Rc<RefCell<VecDeque<String>>>,
    pub shown: Rc<RefCell<Vec<String>>>,
    pub transcript: Rc<RefCell<Vec<String>>>,
    local: PathBuf,
}

impl Console {
    pub fn new(local: PathBuf) -> Console {
        Console {
            answers: Rc::new(RefCell::new(VecDeque::new())),
            shown: Rc::new(RefCell::new(Vec::new())),
            transcript: Rc::new(RefCell::new(Vec::new())),
            local,
        }
    }

    pub fn answer(&self, text: &str) {
        self.answers.borrow_mut().push_back(text.to_owned());
    }

    pub fn shown(&self) -> Vec<String> {
        self.shown.borrow().clone()
    }

    pub fn transcript(&self) -> Vec<String> {
        self.transcript.borrow().clone()
    }
}

impl Frontend for Console {
    fn prompt_line(&mut self, _label: &str) -> io::Result<String> {
        self.answers
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))
    }

    fn display(&mut self, text: &str) {
        self.shown.borrow_mut().push(text.to_owned());
    }

    fn read_local_file(&mut self, path: &str) -> io::Result<Vec<u8>> {
        fs::read(self.local.join(path))
    }

    fn write_local_file(&mut self, path: &str, data: &[u8]) -> io::Result<()> {
        fs::write(self.local.join(path), data)
    }
}

impl LogSink for Console {
    fn log_line(&mut self, line: &str) {
        self.transcript.borrow_mut().push(line.to_owned());
    }
}
