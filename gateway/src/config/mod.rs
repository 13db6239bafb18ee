//! Configuration module for the call bridge server
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use callbridge_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

mod env;
mod merge;
mod validation;
mod yaml;

use crate::core::bridge::BridgeConfig;
use crate::core::realtime::openai::{
    OPENAI_REALTIME_URL, OpenAIRealtimeAudioFormat, OpenAIRealtimeConfig, OpenAIRealtimeModel,
    OpenAIRealtimeVoice,
};

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Realtime AI session settings applied to every call.
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeSettings {
    /// WebSocket endpoint without the model parameter
    pub url: String,
    pub model: String,
    pub voice: String,
    /// System instructions for the assistant
    pub instructions: Option<String>,
    pub temperature: f32,
    /// `g711_ulaw`, `g711_alaw` or `pcm16`
    pub audio_format: String,
    /// Ask the AI to speak first when the call connects
    pub greet_on_connect: bool,
    /// Let server VAD cancel responses on caller speech
    pub interrupt_response: bool,
    pub vad_threshold: Option<f32>,
    pub vad_prefix_padding_ms: Option<u32>,
    pub vad_silence_duration_ms: Option<u32>,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            url: OPENAI_REALTIME_URL.to_string(),
            model: OpenAIRealtimeModel::default().as_str().to_string(),
            voice: OpenAIRealtimeVoice::default().as_str().to_string(),
            instructions: None,
            temperature: 0.8,
            audio_format: OpenAIRealtimeAudioFormat::default().as_str().to_string(),
            greet_on_connect: true,
            interrupt_response: true,
            vad_threshold: None,
            vad_prefix_padding_ms: None,
            vad_silence_duration_ms: None,
        }
    }
}

/// Server configuration
///
/// Contains all configuration needed to run the server:
/// - Server settings (host, port, TLS)
/// - OpenAI credential and realtime session settings
/// - Bridge tuning (timeouts, interruption and truncation policy)
/// - Security settings (CORS, call admission limit)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    /// OpenAI API key for the Realtime API
    pub openai_api_key: Option<String>,

    pub realtime: RealtimeSettings,

    /// Bridge tuning, including `max_concurrent_calls`
    pub bridge: BridgeConfig,

    // Security configuration
    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: None (CORS disabled, same-origin only)
    pub cors_allowed_origins: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            tls: None,
            openai_api_key: None,
            realtime: RealtimeSettings::default(),
            bridge: BridgeConfig::default(),
            cors_allowed_origins: None,
        }
    }
}

/// Zeroize the API key when ServerConfig is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        if let Some(ref mut key) = self.openai_api_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables only
    ///
    /// The .env file is loaded in main.rs at application startup, so its values
    /// are visible here as environment variables.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// After loading and merging, performs validation on the final configuration.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    pub fn has_openai_key(&self) -> bool {
        self.openai_api_key.as_ref().is_some_and(|key| !key.is_empty())
    }

    /// Build the connector settings for the OpenAI Realtime API.
    ///
    /// Fails when no API key is configured.
    pub fn realtime_config(&self) -> Result<OpenAIRealtimeConfig, String> {
        let api_key = self
            .openai_api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| "OPENAI_API_KEY is not configured".to_string())?;

        let realtime = &self.realtime;
        Ok(OpenAIRealtimeConfig {
            api_key,
            url: realtime.url.clone(),
            model: OpenAIRealtimeModel::from_str_or_default(&realtime.model),
            voice: OpenAIRealtimeVoice::from_str_or_default(&realtime.voice),
            audio_format: OpenAIRealtimeAudioFormat::from_str_or_default(&realtime.audio_format),
            instructions: realtime.instructions.clone(),
            temperature: realtime.temperature,
            greet_on_connect: realtime.greet_on_connect,
            interrupt_response: realtime.interrupt_response,
            vad_threshold: realtime.vad_threshold,
            vad_prefix_padding_ms: realtime.vad_prefix_padding_ms,
            vad_silence_duration_ms: realtime.vad_silence_duration_ms,
        })
    }
}
