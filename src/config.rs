use crate::services::edit_client::PollPolicy;
use anyhow::{Context, Result};
use clap::Parser;
use secrecy::SecretString;
use std::{env, path::PathBuf, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables (and `.env`) with CLI arguments; built
/// once at startup and handed to the services that need it.
#[derive(Debug)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub media_root: PathBuf,
    pub outputs_root: PathBuf,
    pub frontend_dir: Option<PathBuf>,
    pub edit_api_key: Option<SecretString>,
    pub edit_base_url: String,
    pub model_api_key: Option<SecretString>,
    pub model_base_url: String,
    pub poll: PollPolicy,
    pub max_upload_bytes: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Hairstyle edit and image-to-3D relay")]
pub struct Args {
    /// Host to bind to (overrides HAIRFUSION_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides HAIRFUSION_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory for raw uploads (overrides MEDIA_ROOT)
    #[arg(long)]
    pub media_root: Option<PathBuf>,

    /// Directory for edited images (overrides OUTPUTS_ROOT)
    #[arg(long)]
    pub outputs_root: Option<PathBuf>,

    /// Static frontend directory served at /frontend (overrides FRONTEND_DIR)
    #[arg(long)]
    pub frontend_dir: Option<PathBuf>,

    /// Seconds between edit status checks (overrides EDIT_POLL_INTERVAL_SECS)
    #[arg(long)]
    pub poll_interval_secs: Option<u64>,

    /// Maximum edit status checks (overrides EDIT_POLL_ATTEMPTS)
    #[arg(long)]
    pub poll_attempts: Option<u32>,
}

pub mod defaults {
    pub const HOST: &str = "0.0.0.0";
    pub const PORT: u16 = 8100;
    pub const MEDIA_ROOT: &str = "uploads";
    pub const OUTPUTS_ROOT: &str = "outputs";
    pub const EDIT_BASE_URL: &str = "https://www.ailabapi.com";
    pub const MODEL_BASE_URL: &str = "https://api.meshy.ai";
    pub const POLL_INTERVAL_SECS: u64 = 3;
    pub const POLL_ATTEMPTS: u32 = 20;
    pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
}

impl AppConfig {
    /// Load `.env`, parse CLI args, and merge with the process environment.
    pub fn from_env_and_args() -> Result<Self> {
        dotenvy::dotenv().ok();
        let args = Args::parse();
        Self::resolve(args, |key| env::var(key).ok())
    }

    /// Merge CLI args over values from `lookup`, then over built-in defaults.
    pub fn resolve(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let secret = |key: &str| text(key).map(|v| SecretString::from(v.trim().to_string()));

        let env_port = parse_var(&lookup, "HAIRFUSION_PORT")?.unwrap_or(defaults::PORT);
        let env_interval =
            parse_var(&lookup, "EDIT_POLL_INTERVAL_SECS")?.unwrap_or(defaults::POLL_INTERVAL_SECS);
        let env_attempts = parse_var(&lookup, "EDIT_POLL_ATTEMPTS")?.unwrap_or(defaults::POLL_ATTEMPTS);
        let max_upload_bytes =
            parse_var(&lookup, "MAX_UPLOAD_BYTES")?.unwrap_or(defaults::MAX_UPLOAD_BYTES);

        let poll = PollPolicy {
            interval: Duration::from_secs(args.poll_interval_secs.unwrap_or(env_interval)),
            max_attempts: args.poll_attempts.unwrap_or(env_attempts),
        };
        if poll.max_attempts == 0 {
            anyhow::bail!("EDIT_POLL_ATTEMPTS must be at least 1");
        }

        Ok(Self {
            host: args
                .host
                .or_else(|| text("HAIRFUSION_HOST"))
                .unwrap_or_else(|| defaults::HOST.into()),
            port: args.port.unwrap_or(env_port),
            media_root: args
                .media_root
                .or_else(|| text("MEDIA_ROOT").map(PathBuf::from))
                .unwrap_or_else(|| defaults::MEDIA_ROOT.into()),
            outputs_root: args
                .outputs_root
                .or_else(|| text("OUTPUTS_ROOT").map(PathBuf::from))
                .unwrap_or_else(|| defaults::OUTPUTS_ROOT.into()),
            frontend_dir: args
                .frontend_dir
                .or_else(|| text("FRONTEND_DIR").map(PathBuf::from)),
            edit_api_key: secret("AILAB_API_KEY"),
            edit_base_url: text("AILAB_BASE_URL").unwrap_or_else(|| defaults::EDIT_BASE_URL.into()),
            model_api_key: secret("MESHY_API_KEY"),
            model_base_url: text("MESHY_BASE_URL").unwrap_or_else(|| defaults::MODEL_BASE_URL.into()),
            poll,
            max_upload_bytes,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        None => Ok(None),
    }
}
