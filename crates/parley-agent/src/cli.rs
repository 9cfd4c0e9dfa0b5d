//! Command-line arguments for the `parley` binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Parley: train dialogue models from stories and chat with them.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    /// Directory of the trained model.
    #[arg(short = 'm', long = "model-dir", global = true)]
    pub model_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Train a dialogue model from a domain and stories.
    Train {
        /// Domain specification (YAML).
        #[arg(short = 'd', long = "domain")]
        domain: PathBuf,

        /// Markdown stories to learn from.
        #[arg(short = 's', long = "stories")]
        stories: PathBuf,

        /// Correct the model interactively after the initial training.
        #[arg(long = "online")]
        online: bool,
    },
    /// Chat with a trained model on the console.
    Run {
        /// Conversation id used for the console session.
        #[arg(long = "sender-id", default_value = "default")]
        sender_id: String,
    },
    /// Replay a dumped conversation, then continue it on the console.
    Restore {
        /// Transcript dump (JSON) to replay.
        tracker_dump: PathBuf,
    },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > PARLEY_CONFIG env var > ~/.parley/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("PARLEY_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the model directory.
    ///
    /// Priority: --model-dir flag > config file value.
    pub fn resolve_model_dir(&self, config_model_dir: &str) -> PathBuf {
        self.model_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(config_model_dir))
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".parley").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".parley").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_train() {
        let args = CliArgs::parse_from([
            "parley", "train", "-d", "domain.yml", "-s", "stories.md", "--online",
        ]);
        match args.command {
            Command::Train {
                domain,
                stories,
                online,
            } => {
                assert_eq!(domain, PathBuf::from("domain.yml"));
                assert_eq!(stories, PathBuf::from("stories.md"));
                assert!(online);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = CliArgs::parse_from(["parley", "run", "--model-dir", "out", "-l", "debug"]);
        assert_eq!(args.resolve_model_dir("models/dialogue"), PathBuf::from("out"));
        assert_eq!(args.resolve_log_level("info"), "debug");
        assert!(matches!(args.command, Command::Run { ref sender_id } if sender_id == "default"));
    }

    #[test]
    fn test_config_flag_wins() {
        let args = CliArgs::parse_from(["parley", "-c", "custom.toml", "restore", "dump.json"]);
        assert_eq!(args.resolve_config_path(), PathBuf::from("custom.toml"));
        assert_eq!(args.resolve_model_dir("models/dialogue"), PathBuf::from("models/dialogue"));
    }
}
