use crate::state::DEFAULT_PUSH_CAPACITY;
use clap::Parser;
use shared::DEFAULT_PORT;
use std::path::PathBuf;

/// Command line arguments for the chat server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Snapshot file loaded at startup and written on shutdown
    #[arg(long, default_value = "serverState.json")]
    pub state_file: PathBuf,

    /// Start fresh and skip writing a snapshot on shutdown
    #[arg(long)]
    pub no_persist: bool,

    /// Username to hold the owner role; may be repeated
    #[arg(long = "owner")]
    pub owners: Vec<String>,

    /// Envelopes buffered per session before pushes are dropped
    #[arg(long, default_value_t = DEFAULT_PUSH_CAPACITY)]
    pub push_capacity: usize,
}

impl Args {
    pub fn into_config(self) -> ServerConfig {
        ServerConfig {
            host: self.host,
            port: self.port,
            state_file: if self.no_persist {
                None
            } else {
                Some(self.state_file)
            },
            owners: self.owners,
            push_capacity: self.push_capacity,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// `None` disables both loading and saving.
    pub state_file: Option<PathBuf>,
    pub owners: Vec<String>,
    pub push_capacity: usize,
}

impl ServerConfig {
    /// Loopback on an ephemeral port without persistence.
    pub fn local() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            state_file: None,
            owners: Vec::new(),
            push_capacity: DEFAULT_PUSH_CAPACITY,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let config = Args::try_parse_from(["server"]).unwrap().into_config();
        assert_eq!(config.address(), "0.0.0.0:5461");
        assert_eq!(config.state_file, Some(PathBuf::from("serverState.json")));
        assert!(config.owners.is_empty());
        assert_eq!(config.push_capacity, DEFAULT_PUSH_CAPACITY);
    }

    #[test]
    fn test_owner_flag_repeats() {
        let args = Args::try_parse_from([
            "server", "--owner", "root", "--owner", "dora", "--no-persist", "-p", "9000",
        ])
        .unwrap();
        let config = args.into_config();
        assert_eq!(config.owners, vec!["root", "dora"]);
        assert_eq!(config.state_file, None);
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn test_local_config() {
        let config = ServerConfig::local();
        assert_eq!(config.address(), "127.0.0.1:0");
        assert!(config.state_file.is_none());
    }
}
