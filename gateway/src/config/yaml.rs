use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present
/// here override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 8000
///   tls:
///     enabled: true
///     cert_path: "/etc/callbridge/cert.pem"
///     key_path: "/etc/callbridge/key.pem"
///
/// providers:
///   openai_api_key: "sk-..."
///
/// realtime:
///   model: "gpt-realtime"
///   voice: "ash"
///   instructions: "You are a helpful phone assistant."
///   temperature: 0.8
///   audio_format: "g711_ulaw"
///   greet_on_connect: true
///   interrupt_response: true
///
/// bridge:
///   connect_timeout_ms: 10000
///   max_call_duration_secs: 3600
///   interruption_trigger: "provider_vad"
///   truncation: "playback_marks"
///   playback_marks: true
///
/// security:
///   cors_allowed_origins: "*"
///   max_concurrent_calls: 100
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub providers: Option<ProvidersYaml>,
    pub realtime: Option<RealtimeYaml>,
    pub bridge: Option<BridgeYaml>,
    pub security: Option<SecurityYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<TlsYaml>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub enabled: Option<bool>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// Provider API keys from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersYaml {
    /// OpenAI API key for the Realtime API
    pub openai_api_key: Option<String>,
}

/// Realtime session settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RealtimeYaml {
    pub url: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub instructions: Option<String>,
    pub temperature: Option<f32>,
    pub audio_format: Option<String>,
    pub greet_on_connect: Option<bool>,
    pub interrupt_response: Option<bool>,
    pub vad_threshold: Option<f32>,
    pub vad_prefix_padding_ms: Option<u32>,
    pub vad_silence_duration_ms: Option<u32>,
}

/// Bridge tuning from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BridgeYaml {
    pub connect_timeout_ms: Option<u64>,
    pub max_call_duration_secs: Option<u64>,
    pub interruption_grace_ms: Option<u64>,
    /// `provider_vad`, `caller_energy` or `any`
    pub interruption_trigger: Option<String>,
    pub energy_threshold: Option<f64>,
    pub energy_min_frames: Option<u32>,
    /// `wall_clock` or `playback_marks`
    pub truncation: Option<String>,
    pub max_consecutive_frame_errors: Option<u32>,
    pub max_pending_upstream_frames: Option<usize>,
    /// Re-frame AI audio into chunks of this many ms; 0 disables re-framing
    pub telephony_frame_ms: Option<u32>,
    pub playback_marks: Option<bool>,
}

/// Security configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    /// CORS allowed origins (comma-separated list or "*" for all)
    pub cors_allowed_origins: Option<String>,
    /// Calls bridged at once; further calls are rejected
    pub max_concurrent_calls: Option<usize>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Required fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
