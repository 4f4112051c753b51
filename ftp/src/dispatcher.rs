use std::str::FromStr;

use crate::{ConnectionMode, Session, SessionError};

use anyhow::{Error, Result};
use strum::{EnumMessage, IntoEnumIterator};
use strum_macros::{Display, EnumIter, EnumMessage, EnumString};

#[derive(EnumString, Display, EnumIter, EnumMessage, Debug, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum UserCommand {
    #[strum(message = "change remote working directory")]
    Cd,
    #[strum(message = "print remote working directory")]
    Pwd,
    #[strum(message = "list remote directory contents")]
    Ls,
    #[strum(message = "download: get <remote-file> <local-file>")]
    Get,
    #[strum(message = "upload: put <local-file> <remote-file>")]
    Put,
    #[strum(message = "show remote system type")]
    System,
    #[strum(message = "show available commands")]
    Help,
    #[strum(message = "show help from the server")]
    RemoteHelp,
    #[strum(message = "close the session and exit")]
    Quit,
    #[strum(message = "toggle echoing of server replies")]
    Verbose,
    #[strum(message = "use passive mode (PASV) for transfers")]
    Pasv,
    #[strum(message = "use extended passive mode (EPSV) for transfers")]
    Epsv,
    #[strum(message = "use active mode (PORT) for transfers")]
    Port,
    #[strum(message = "use extended active mode (EPRT) for transfers")]
    Eprt,
}

impl UserCommand {
    pub fn requires_connection(&self) -> bool {
        use UserCommand::*;
        matches!(self, Cd | Pwd | Ls | Get | Put | System | RemoteHelp)
    }

    pub fn help_text() -> String {
        let mut commands: Vec<UserCommand> = UserCommand::iter().collect();
        commands.sort_by_key(|command| command.to_string());
        commands
            .iter()
            .map(|command| {
                format!(
                    "{:<12}{}",
                    command.to_string(),
                    command.get_message().unwrap_or_default()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Usage: {usage}")]
pub struct UsageError {
    pub usage: &'static str,
}

const GET_USAGE: &str = "get <remote-file> <local-file> (paths may not contain spaces)";
const PUT_USAGE: &str = "put <local-file> <remote-file> (paths may not contain spaces)";
const CD_USAGE: &str = "cd <remote-directory>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Dispatcher {
    session: Session,
}

impl Dispatcher {
    pub fn new(session: Session) -> Dispatcher {
        Dispatcher { session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn execute(&mut self, line: &str) -> Result<Flow> {
        let args: Vec<&str> = line.split_whitespace().collect();
        let (verb, args) = match args.split_first() {
            Some((verb, args)) => (*verb, args),
            None => return Ok(Flow::Continue),
        };
        let command = match UserCommand::from_str(verb) {
            Ok(command) => command,
            Err(_) => {
                self.session.display("Invalid command.");
                return Ok(Flow::Continue);
            }
        };
        if command.requires_connection() && !self.session.is_connected() {
            self.session.display("Not connected.");
            return Ok(Flow::Continue);
        }
        log::debug!("Running {} {:?}", command, args);
        let result = self.dispatch(command, args);
        self.recover(result)
    }

    fn recover(&mut self, result: Result<Flow>) -> Result<Flow> {
        match result {
            Ok(flow) => Ok(flow),
            Err(err) if err.is::<SessionError>() => {
                self.session.display(&err.to_string());
                Err(err)
            }
            Err(err) => {
                log::warn!("Command failed: {:#}", err);
                self.session.display(&err.to_string());
                Ok(Flow::Continue)
            }
        }
    }

    fn dispatch(&mut self, command: UserCommand, args: &[&str]) -> Result<Flow> {
        use UserCommand::*;

        match command {
            Cd => {
                if args.is_empty() {
                    return Err(Error::new(UsageError { usage: CD_USAGE }));
                }
                self.session.cwd(&args.join(" "))?;
            }
            Pwd => {
                self.session.pwd()?;
            }
            Ls => self.session.list(&args.join(" "))?,
            Get => {
                let (remote, local) = self.collect_paths(args, ["Remote file: ", "Local file: "], GET_USAGE)?;
                self.session.retr(&remote, &local)?;
            }
            Put => {
                let (local, remote) = self.collect_paths(args, ["Local file: ", "Remote file: "], PUT_USAGE)?;
                self.session.stor(&local, &remote)?;
            }
            System => {
                self.session.syst()?;
            }
            Help => {
                self.session.display("Some commands are abbreviated:");
                self.session.display(&UserCommand::help_text());
            }
            RemoteHelp => {
                self.session.remote_help(&args.join(" "))?;
            }
            Quit => {
                self.session.close();
                return Ok(Flow::Quit);
            }
            Verbose => {
                let verbose = !self.session.verbose();
                self.session.set_verbose(verbose);
                self.session
                    .display(if verbose { "Verbose mode on." } else { "Verbose mode off." });
            }
            Pasv => {
                self.session.toggle_mode(ConnectionMode::Passive);
            }
            Epsv => {
                self.session.toggle_mode(ConnectionMode::ExtendedPassive);
            }
            Port => {
                self.session.toggle_mode(ConnectionMode::Active);
            }
            Eprt => {
                self.session.toggle_mode(ConnectionMode::ExtendedActive);
            }
        }
        Ok(Flow::Continue)
    }

    fn collect_paths(
        &mut self,
        args: &[&str],
        labels: [&str; 2],
        usage: &'static str,
    ) -> Result<(String, String)> {
        if args.len() > 2 {
            return Err(Error::new(UsageError { usage }));
        }
        let mut paths: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        for label in &labels[paths.len()..] {
            let answer = self.session.frontend().prompt_line(label)?;
            paths.push(answer.trim().to_owned());
        }
        if paths.iter().any(|path| path.is_empty() || path.contains(' ')) {
            return Err(Error::new(UsageError { usage }));
        }
        let second = paths.pop().unwrap_or_default();
        let first = paths.pop().unwrap_or_default();
        Ok((first, second))
    }
}
