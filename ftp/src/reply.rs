use std::borrow::Cow;
use std::fmt::{Display, Formatter};

use strum::{EnumMessage, IntoEnumIterator};
use strum_macros::{EnumIter, EnumMessage};

#[derive(EnumMessage, EnumIter, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyCode {
    #[strum(message = "Data connection already open; transfer starting")]
    TransferStarting,
    #[strum(message = "File status okay; about to open data connection")]
    OpeningDataConnection,

    #[strum(message = "Command okay")]
    CommandOk,
    #[strum(message = "Help message")]
    HelpMessage,
    #[strum(message = "System type")]
    SystemType,
    #[strum(message = "Service ready for new user")]
    ServiceReady,
    #[strum(message = "Service closing control connection")]
    ServiceClosing,
    #[strum(message = "Closing data connection. Requested file action successful")]
    ClosingDataConnection,
    #[strum(message = "Entering passive mode")]
    EnteringPassiveMode,
    #[strum(message = "Entering extended passive mode")]
    EnteringExtendedPassiveMode,
    #[strum(message = "User logged in, proceed")]
    UserLoggedIn,
    #[strum(message = "Requested file action okay, completed")]
    FileActionOk,
    #[strum(message = "Pathname created")]
    PathnameCreated,

    #[strum(message = "User name okay, need password")]
    PasswordNeeded,

    #[strum(message = "Service not available, closing control connection")]
    ServiceNotAvailable,
    #[strum(message = "Can't open data connection")]
    CantOpenDataConnection,

    #[strum(message = "Command not implemented")]
    NotImplemented,
    #[strum(message = "Not logged in")]
    NotLoggedIn,
    #[strum(message = "Requested action not taken. File unavailable")]
    FileUnavailable,
}

impl ReplyCode {
    pub fn code(&self) -> u32 {
        use ReplyCode::*;
        match self {
            TransferStarting => 125,
            OpeningDataConnection => 150,

            CommandOk => 200,
            HelpMessage => 214,
            SystemType => 215,
            ServiceReady => 220,
            ServiceClosing => 221,
            ClosingDataConnection => 226,
            EnteringPassiveMode => 227,
            EnteringExtendedPassiveMode => 229,
            UserLoggedIn => 230,
            FileActionOk => 250,
            PathnameCreated => 257,

            PasswordNeeded => 331,

            ServiceNotAvailable => 421,
            CantOpenDataConnection => 425,

            NotImplemented => 502,
            NotLoggedIn => 530,
            FileUnavailable => 550,
        }
    }

    pub fn from_code(code: u32) -> Option<ReplyCode> {
        ReplyCode::iter().find(|known| known.code() == code)
    }

    pub fn description(&self) -> &'static str {
        self.get_message().unwrap_or_default()
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("Malformed server reply {raw:?}")]
pub struct MalformedReply {
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerReply {
    pub code: u32,
    pub message: String,
}

impl ServerReply {
    pub fn new(code: u32, message: &str) -> ServerReply {
        ServerReply {
            code,
            message: message.to_owned(),
        }
    }

    pub fn parse(raw: &[u8]) -> Result<ServerReply, MalformedReply> {
        let text = decode(raw);
        let text = text.trim();
        let malformed = || MalformedReply {
            raw: text.to_owned(),
        };

        let mut boundaries = text.char_indices().map(|(i, _)| i).skip(3);
        let code_end = match boundaries.next() {
            Some(i) => i,
            None if text.chars().count() == 3 => text.len(),
            None => return Err(malformed()),
        };
        let prefix = &text[..code_end];
        if !prefix.chars().all(|c| c.is_ascii_digit()) {
            return Err(malformed());
        }
        let code = prefix.parse::<u32>().map_err(|_| malformed())?;
        let message = match boundaries.next() {
            Some(i) => &text[i..],
            None => "",
        };
        Ok(ServerReply::new(code, message))
    }

    pub fn is(&self, code: ReplyCode) -> bool {
        self.code == code.code()
    }

    pub fn known_code(&self) -> Option<ReplyCode> {
        ReplyCode::from_code(self.code)
    }

    pub fn contains_line_with_code(&self, code: u32) -> bool {
        let code = code.to_string();
        self.message
            .lines()
            .skip(1)
            .any(|line| line.trim_start().starts_with(&code))
    }

    pub fn starts_transfer(&self) -> bool {
        self.is(ReplyCode::OpeningDataConnection)
            || self.is(ReplyCode::TransferStarting)
            || self.is(ReplyCode::ClosingDataConnection)
            || self.message.contains("150")
    }

    pub fn completes_transfer(&self) -> bool {
        self.is(ReplyCode::ClosingDataConnection)
            || self.contains_line_with_code(ReplyCode::ClosingDataConnection.code())
    }
}

impl Display for ServerReply {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:03} {}", self.code, self.message)
    }
}

fn decode(raw: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(raw) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => Cow::Owned(raw.iter().map(|&b| b as char).collect()),
    }
}
