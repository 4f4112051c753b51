use crate::config::{CliConfig, Config, TomlConfig};
use crate::terminal::Terminal;
use ftp::{Dispatcher, Flow, LogFacade, ReplyCode, Session, SessionError, UserCommand};

use clap::Parser;
use simplelog::{ColorChoice, CombinedLogger, TermLogger, TerminalMode, WriteLogger};
use user_error::UserFacingError;

use std::fs::{read_to_string, OpenOptions};
use std::io::ErrorKind;
use std::str::FromStr;

pub struct App {}

impl App {
    pub fn run() -> Result<(), UserFacingError> {
        let mut config = Config::default();

        let cli_config = CliConfig::parse();

        let toml_config = if let Some(toml_path) = &cli_config.config_file {
            let toml_input = Self::fallible_config_read(toml_path)?;
            Some((toml_path.to_string(), toml_input))
        } else {
            Self::read_default_config()
        };

        if let Some((toml_path, toml_input)) = toml_config {
            let toml_config = Self::decode_toml(&toml_path, &toml_input)?;
            config.merge(&toml_config);
        }

        config.merge(&cli_config);

        Self::init_logger(&config)?;
        Self::run_session(config)
    }

    fn init_logger(config: &Config) -> Result<(), UserFacingError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.log_file)
            .map_err(|err| {
                UserFacingError::new(format!("Could not open log file {}", config.log_file))
                    .reason(err.to_string())
                    .help("Pass a writable path as the second argument")
            })?;
        CombinedLogger::init(vec![
            TermLogger::new(
                config.log.console,
                simplelog::Config::default(),
                TerminalMode::Mixed,
                ColorChoice::Auto,
            ),
            WriteLogger::new(config.log.file, simplelog::Config::default(), file),
        ])
        .map_err(|err| UserFacingError::new("Could not set up logging").reason(err.to_string()))
    }

    fn run_session(config: Config) -> Result<(), UserFacingError> {
        let session = Session::new(
            config.session.clone(),
            Box::new(Terminal {}),
            Box::new(LogFacade::default()),
        );
        let mut dispatcher = Dispatcher::new(session);

        Self::open(&mut dispatcher, &config)?;

        loop {
            let line = match dispatcher.session_mut().frontend().prompt_line("ftp> ") {
                Ok(line) => line,
                Err(err) => {
                    log::info!("Input closed: {}", err);
                    dispatcher.session_mut().close();
                    return Ok(());
                }
            };
            match dispatcher.execute(&line) {
                Ok(Flow::Continue) => continue,
                Ok(Flow::Quit) => return Ok(()),
                Err(err) => {
                    return Err(UserFacingError::new("The FTP session ended")
                        .reason(err.to_string())
                        .help("Run the client again to reconnect"))
                }
            }
        }
    }

    /// Connects, waits for the banner and logs in.
    fn open(dispatcher: &mut Dispatcher, config: &Config) -> Result<(), UserFacingError> {
        let session = dispatcher.session_mut();
        let connection_error = |err: anyhow::Error| {
            let error = UserFacingError::new(format!(
                "Could not talk to {}:{}",
                config.host, config.port
            ));
            match err.downcast_ref::<SessionError>() {
                Some(SessionError::CredentialsRequired) => error
                    .reason(err.to_string())
                    .help("Enter the account password when asked"),
                Some(SessionError::Connect { .. }) => error
                    .reason(err.to_string())
                    .help("Check the host name and port, and that the server is running"),
                _ => error.reason(err.to_string()),
            }
        };

        session
            .connect(&config.host, config.port)
            .map_err(connection_error)?;
        session.await_ready().map_err(connection_error)?;

        let user = match &config.user {
            Some(user) => user.clone(),
            None => Self::ask_user(session, config)?,
        };
        let password = match session.frontend().prompt_line("Password: ") {
            Ok(password) => Some(password),
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => None,
            Err(err) => return Err(UserFacingError::new("Login cancelled").reason(err.to_string())),
        };
        let reply = session
            .login(&user, password.as_deref())
            .map_err(connection_error)?;
        if !reply.is(ReplyCode::UserLoggedIn) {
            session.close();
            return Err(UserFacingError::new("Login failed")
                .reason(format!("Server response: {}", reply)));
        }

        session.display("Login Successful.");
        session.display("Available Commands:");
        session.display(&UserCommand::help_text());
        Ok(())
    }

    fn ask_user(session: &mut Session, config: &Config) -> Result<String, UserFacingError> {
        let host = session.host().unwrap_or(&config.host).to_owned();
        let label = format!("User ({}:{}): ", host, session.port());
        loop {
            match session.frontend().prompt_line(&label) {
                Ok(user) if user.is_empty() => continue,
                Ok(user) => return Ok(user),
                Err(err) => {
                    session.close();
                    return Err(UserFacingError::new("Login cancelled").reason(err.to_string()));
                }
            }
        }
    }

    fn fallible_config_read(path: &str) -> Result<String, UserFacingError> {
        match read_to_string(path) {
            Ok(config) => Ok(config),
            Err(err) => {
                let error = UserFacingError::new(format!("Could not read {} config file", path));
                let error = match err.kind() {
                    ErrorKind::NotFound => error.reason("File not found"),
                    ErrorKind::PermissionDenied => {
                        error.reason("Insufficient permissions to open the file")
                    }
                    ErrorKind::InvalidData => error.reason("Config file is probably invalid UTF-8"),
                    _ => error.reason("It is due to unexpected reasons"),
                };
                Err(error.help(err.to_string()))
            }
        }
    }

    fn read_default_config() -> Option<(String, String)> {
        static TOML_CONFIG_PATHS: &[&str] = &["ftp-client.toml"];

        for path in TOML_CONFIG_PATHS {
            if let Ok(config) = read_to_string(path) {
                return Some((path.to_string(), config));
            }
        }
        None
    }

    fn decode_toml(toml_path: &str, toml_input: &str) -> Result<TomlConfig, UserFacingError> {
        match TomlConfig::from_str(toml_input) {
            Ok(toml_config) => Ok(toml_config),
            Err(err) => {
                let error = UserFacingError::new(format!("Unable to decode {} file", toml_path))
                    .reason("Could not deserialize toml input");
                let error = match err.line_col() {
                    None => error,
                    Some((line, col)) => {
                        error.help(format!("The problem is on line {} column {}", line, col))
                    }
                };
                Err(error.help(err.to_string()))
            }
        }
    }
}
