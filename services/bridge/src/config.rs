use secrecy::SecretString;
use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Audio-path knobs. The originals hard-coded these; here they are explicit
/// configuration with documented defaults.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioConfig {
    /// Sample rate of the telephony media stream, Hz.
    pub telephony_rate: u32,
    /// Sample rate the voice-AI session consumes and produces, Hz.
    pub ai_rate: u32,
    /// Fixed output chunk size of both resampling directions, bytes.
    pub chunk_bytes: usize,
    /// Forward frames the platform flagged as silence instead of dropping
    /// them before resampling.
    pub forward_silence: bool,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub openai_api_key: SecretString,
    pub realtime_url: String,
    pub voice: String,
    pub system_prompt: String,
    pub audio: AudioConfig,
    /// How long session teardown waits for tasks to observe cancellation.
    pub close_grace_ms: u64,
    pub log_level: Level,
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful voice assistant answering a phone call. \
    Keep responses short and conversational; the caller hears them as synthesized speech.";

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let openai_api_key: SecretString = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?
            .into();

        let model = std::env::var("REALTIME_MODEL")
            .unwrap_or_else(|_| "gpt-4o-realtime-preview".to_string());
        let realtime_url = std::env::var("OPENAI_REALTIME_URL").unwrap_or_else(|_| {
            format!("wss://api.openai.com/v1/realtime?model={model}")
        });

        let voice = std::env::var("REALTIME_VOICE").unwrap_or_else(|_| "alloy".to_string());
        let system_prompt = std::env::var("SYSTEM_PROMPT")
            .unwrap_or_else(|_| DEFAULT_SYSTEM_PROMPT.to_string());

        let audio = AudioConfig {
            telephony_rate: parse_var("TELEPHONY_SAMPLE_RATE", 16000u32)?,
            ai_rate: parse_var("AI_SAMPLE_RATE", 24000u32)?,
            chunk_bytes: parse_var("CHUNK_BYTES", 640usize)?,
            forward_silence: parse_var("FORWARD_SILENCE", false)?,
        };
        if audio.telephony_rate == 0 || audio.ai_rate == 0 {
            return Err(ConfigError::InvalidValue(
                "TELEPHONY_SAMPLE_RATE/AI_SAMPLE_RATE".to_string(),
                "sample rates must be non-zero".to_string(),
            ));
        }
        if audio.chunk_bytes == 0 || audio.chunk_bytes % 2 != 0 {
            return Err(ConfigError::InvalidValue(
                "CHUNK_BYTES".to_string(),
                "chunk size must be a non-zero even number of bytes".to_string(),
            ));
        }

        let close_grace_ms = parse_var("CLOSE_GRACE_MS", 3000u64)?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            openai_api_key,
            realtime_url,
            voice,
            system_prompt,
            audio,
            close_grace_ms,
            log_level,
        })
    }
}
