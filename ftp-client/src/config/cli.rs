use clap::Parser;

use super::{Config, ConfigChanges};

#[derive(Parser)]
#[clap(version, author)]
pub struct CliConfig {
    /// Host name or address of the FTP server
    pub host: String,
    /// File the session transcript is appended to
    pub log_file: String,
    /// Port of the control connection
    pub port: Option<u16>,

    /// Sets the path to toml configuration file
    #[clap(name = "config", short, long)]
    pub config_file: Option<String>,
    /// Logs in as this user instead of asking for a name
    #[clap(short, long)]
    pub user: Option<String>,
    /// Starts with verbose mode off
    #[clap(short, long)]
    pub quiet: bool,
}

impl ConfigChanges for CliConfig {
    fn apply(&self, config: &mut Config) {
        config.host = self.host.clone();
        config.log_file = self.log_file.clone();
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(user) = &self.user {
            config.user = Some(user.clone());
        }
        if self.quiet {
            config.session.verbose = false;
        }
    }
}
