use crate::models::media::UnknownExtensionPolicy;
use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::{env, str::FromStr, time::Duration};

const DEFAULT_MAX_FILE_SIZE: u64 = 200 * 1024 * 1024;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub upload_dir: String,
    pub max_file_size: u64,
    pub read_timeout: Duration,
    pub unknown_extensions: UnknownExtensionPolicy,
    pub max_conversations: usize,
    pub conversation_ttl: Duration,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Learning-material server with range-aware delivery")]
pub struct Args {
    /// Host to bind to (overrides LEARNWISE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides LEARNWISE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where uploads are stored (overrides LEARNWISE_UPLOAD_DIR)
    #[arg(long)]
    pub upload_dir: Option<String>,

    /// Largest accepted upload in bytes (overrides LEARNWISE_MAX_FILE_SIZE)
    #[arg(long)]
    pub max_file_size: Option<u64>,

    /// Per-read timeout while streaming files (overrides LEARNWISE_READ_TIMEOUT_SECS)
    #[arg(long)]
    pub read_timeout_secs: Option<u64>,

    /// How to deliver files with unrecognised extensions (overrides LEARNWISE_UNKNOWN_EXTENSIONS)
    #[arg(long, value_enum)]
    pub unknown_extensions: Option<UnknownExtensionPolicy>,

    /// Conversations kept in memory before the least recent is evicted
    /// (overrides LEARNWISE_MAX_CONVERSATIONS)
    #[arg(long)]
    pub max_conversations: Option<usize>,

    /// Idle time after which a conversation is forgotten
    /// (overrides LEARNWISE_CONVERSATION_TTL_SECS)
    #[arg(long)]
    pub conversation_ttl_secs: Option<u64>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        // Parse CLI once
        let args = Args::parse();
        Self::from_sources(args, |key| env::var(key).ok())
    }

    /// Merge CLI args over values from `lookup`, falling back to defaults.
    pub fn from_sources<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Environment fallback ---
        let env_host = lookup("LEARNWISE_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port = parse_var(&lookup, "LEARNWISE_PORT", 3001u16)?;
        let env_upload_dir =
            lookup("LEARNWISE_UPLOAD_DIR").unwrap_or_else(|| "./uploads".into());
        let env_max_file_size =
            parse_var(&lookup, "LEARNWISE_MAX_FILE_SIZE", DEFAULT_MAX_FILE_SIZE)?;
        let env_read_timeout = parse_var(&lookup, "LEARNWISE_READ_TIMEOUT_SECS", 30u64)?;
        let env_unknown = parse_var(
            &lookup,
            "LEARNWISE_UNKNOWN_EXTENSIONS",
            UnknownExtensionPolicy::default(),
        )?;
        let env_max_conversations = parse_var(&lookup, "LEARNWISE_MAX_CONVERSATIONS", 1000usize)?;
        let env_ttl = parse_var(&lookup, "LEARNWISE_CONVERSATION_TTL_SECS", 86_400u64)?;

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            upload_dir: args.upload_dir.unwrap_or(env_upload_dir),
            max_file_size: args.max_file_size.unwrap_or(env_max_file_size),
            read_timeout: Duration::from_secs(args.read_timeout_secs.unwrap_or(env_read_timeout)),
            unknown_extensions: args.unknown_extensions.unwrap_or(env_unknown),
            max_conversations: args.max_conversations.unwrap_or(env_max_conversations),
            conversation_ttl: Duration::from_secs(args.conversation_ttl_secs.unwrap_or(env_ttl)),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value
            .parse::<T>()
            .map_err(|err| anyhow!("{}", err))
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        None => Ok(default),
    }
}
