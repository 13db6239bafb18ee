//! Layering of defaults, environment variables and YAML overrides.

use std::path::PathBuf;

use super::env;
use super::yaml::YamlConfig;
use super::{ServerConfig, TlsConfig};
use crate::core::bridge::{InterruptionTrigger, TruncationMode};
use crate::core::realtime::openai::OpenAIRealtimeAudioFormat;

/// Build the final configuration: defaults, then ENV, then YAML.
pub(super) fn merge_config(
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = ServerConfig::default();
    apply_env(&mut config)?;
    if let Some(yaml) = yaml {
        apply_yaml(&mut config, yaml)?;
    }
    config.bridge.ai_format =
        OpenAIRealtimeAudioFormat::from_str_or_default(&config.realtime.audio_format).audio_format();
    Ok(config)
}

fn trigger(raw: &str) -> Result<InterruptionTrigger, String> {
    InterruptionTrigger::parse(raw).ok_or_else(|| {
        format!("Invalid interruption trigger: {raw} (expected provider_vad, caller_energy or any)")
    })
}

fn truncation(raw: &str) -> Result<TruncationMode, String> {
    TruncationMode::parse(raw).ok_or_else(|| {
        format!("Invalid truncation mode: {raw} (expected wall_clock or playback_marks)")
    })
}

fn tls(
    enabled: bool,
    cert_path: Option<String>,
    key_path: Option<String>,
) -> Result<Option<TlsConfig>, String> {
    if !enabled {
        return Ok(None);
    }
    match (cert_path, key_path) {
        (Some(cert), Some(key)) => Ok(Some(TlsConfig {
            cert_path: PathBuf::from(cert),
            key_path: PathBuf::from(key),
        })),
        _ => Err("TLS is enabled but cert_path or key_path is missing".to_string()),
    }
}

fn apply_env(config: &mut ServerConfig) -> Result<(), String> {
    if let Some(host) = env::var("HOST") {
        config.host = host;
    }
    if let Some(port) = env::parse("PORT")? {
        config.port = port;
    }
    config.tls = tls(
        env::flag("TLS_ENABLED")?.unwrap_or(false),
        env::var("TLS_CERT_PATH"),
        env::var("TLS_KEY_PATH"),
    )?;

    config.openai_api_key = env::var("OPENAI_API_KEY");

    let realtime = &mut config.realtime;
    if let Some(url) = env::var("OPENAI_REALTIME_URL") {
        realtime.url = url;
    }
    if let Some(model) = env::var("REALTIME_MODEL") {
        realtime.model = model;
    }
    if let Some(voice) = env::var("REALTIME_VOICE") {
        realtime.voice = voice;
    }
    if let Some(instructions) = env::var("REALTIME_INSTRUCTIONS") {
        realtime.instructions = Some(instructions);
    }
    if let Some(temperature) = env::parse("REALTIME_TEMPERATURE")? {
        realtime.temperature = temperature;
    }
    if let Some(format) = env::var("REALTIME_AUDIO_FORMAT") {
        realtime.audio_format = format;
    }
    if let Some(greet) = env::flag("REALTIME_GREET_ON_CONNECT")? {
        realtime.greet_on_connect = greet;
    }
    if let Some(interrupt) = env::flag("REALTIME_INTERRUPT_RESPONSE")? {
        realtime.interrupt_response = interrupt;
    }

    let bridge = &mut config.bridge;
    if let Some(ms) = env::parse("BRIDGE_CONNECT_TIMEOUT_MS")? {
        bridge.connect_timeout_ms = ms;
    }
    if let Some(secs) = env::parse("BRIDGE_MAX_CALL_DURATION_SECS")? {
        bridge.max_call_duration_secs = secs;
    }
    if let Some(ms) = env::parse("BRIDGE_INTERRUPTION_GRACE_MS")? {
        bridge.interruption_grace_ms = ms;
    }
    if let Some(raw) = env::var("BRIDGE_INTERRUPTION_TRIGGER") {
        bridge.interruption_trigger = trigger(&raw)?;
    }
    if let Some(threshold) = env::parse("BRIDGE_ENERGY_THRESHOLD")? {
        bridge.energy_threshold = threshold;
    }
    if let Some(frames) = env::parse("BRIDGE_ENERGY_MIN_FRAMES")? {
        bridge.energy_min_frames = frames;
    }
    if let Some(raw) = env::var("BRIDGE_TRUNCATION") {
        bridge.truncation = truncation(&raw)?;
    }
    if let Some(max) = env::parse("BRIDGE_MAX_FRAME_ERRORS")? {
        bridge.max_consecutive_frame_errors = max;
    }
    if let Some(max) = env::parse("BRIDGE_MAX_PENDING_FRAMES")? {
        bridge.max_pending_upstream_frames = max;
    }
    if let Some(ms) = env::parse("BRIDGE_TELEPHONY_FRAME_MS")? {
        bridge.telephony_frame_ms = ms;
    }
    if let Some(marks) = env::flag("BRIDGE_PLAYBACK_MARKS")? {
        bridge.playback_marks = marks;
    }

    config.cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS");
    if let Some(max) = env::parse("MAX_CONCURRENT_CALLS")? {
        config.bridge.max_concurrent_calls = Some(max);
    }
    Ok(())
}

fn apply_yaml(config: &mut ServerConfig, yaml: YamlConfig) -> Result<(), String> {
    if let Some(server) = yaml.server {
        if let Some(host) = server.host {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
        if let Some(tls_yaml) = server.tls {
            let (cert, key) = match &config.tls {
                Some(existing) => (
                    Some(existing.cert_path.display().to_string()),
                    Some(existing.key_path.display().to_string()),
                ),
                None => (None, None),
            };
            config.tls = tls(
                tls_yaml.enabled.unwrap_or(config.tls.is_some()),
                tls_yaml.cert_path.or(cert),
                tls_yaml.key_path.or(key),
            )?;
        }
    }

    if let Some(key) = yaml.providers.and_then(|providers| providers.openai_api_key) {
        config.openai_api_key = Some(key);
    }

    if let Some(rt) = yaml.realtime {
        let realtime = &mut config.realtime;
        if let Some(url) = rt.url {
            realtime.url = url;
        }
        if let Some(model) = rt.model {
            realtime.model = model;
        }
        if let Some(voice) = rt.voice {
            realtime.voice = voice;
        }
        if rt.instructions.is_some() {
            realtime.instructions = rt.instructions;
        }
        if let Some(temperature) = rt.temperature {
            realtime.temperature = temperature;
        }
        if let Some(format) = rt.audio_format {
            realtime.audio_format = format;
        }
        if let Some(greet) = rt.greet_on_connect {
            realtime.greet_on_connect = greet;
        }
        if let Some(interrupt) = rt.interrupt_response {
            realtime.interrupt_response = interrupt;
        }
        if rt.vad_threshold.is_some() {
            realtime.vad_threshold = rt.vad_threshold;
        }
        if rt.vad_prefix_padding_ms.is_some() {
            realtime.vad_prefix_padding_ms = rt.vad_prefix_padding_ms;
        }
        if rt.vad_silence_duration_ms.is_some() {
            realtime.vad_silence_duration_ms = rt.vad_silence_duration_ms;
        }
    }

    if let Some(b) = yaml.bridge {
        let bridge = &mut config.bridge;
        if let Some(ms) = b.connect_timeout_ms {
            bridge.connect_timeout_ms = ms;
        }
        if let Some(secs) = b.max_call_duration_secs {
            bridge.max_call_duration_secs = secs;
        }
        if let Some(ms) = b.interruption_grace_ms {
            bridge.interruption_grace_ms = ms;
        }
        if let Some(raw) = b.interruption_trigger {
            bridge.interruption_trigger = trigger(&raw)?;
        }
        if let Some(threshold) = b.energy_threshold {
            bridge.energy_threshold = threshold;
        }
        if let Some(frames) = b.energy_min_frames {
            bridge.energy_min_frames = frames;
        }
        if let Some(raw) = b.truncation {
            bridge.truncation = truncation(&raw)?;
        }
        if let Some(max) = b.max_consecutive_frame_errors {
            bridge.max_consecutive_frame_errors = max;
        }
        if let Some(max) = b.max_pending_upstream_frames {
            bridge.max_pending_upstream_frames = max;
        }
        if let Some(ms) = b.telephony_frame_ms {
            bridge.telephony_frame_ms = ms;
        }
        if let Some(marks) = b.playback_marks {
            bridge.playback_marks = marks;
        }
    }

    if let Some(security) = yaml.security {
        if security.cors_allowed_origins.is_some() {
            config.cors_allowed_origins = security.cors_allowed_origins;
        }
        if security.max_concurrent_calls.is_some() {
            config.bridge.max_concurrent_calls = security.max_concurrent_calls;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tls_requires_both_paths() {
        assert!(tls(false, None, None).unwrap().is_none());
        assert!(tls(true, Some("cert.pem".into()), None).is_err());
        let config = tls(true, Some("cert.pem".into()), Some("key.pem".into()))
            .unwrap()
            .unwrap();
        assert_eq!(config.key_path, PathBuf::from("key.pem"));
    }

    #[test]
    fn test_yaml_layer_rejects_unknown_policy() {
        let mut config = ServerConfig::default();
        let yaml: YamlConfig = serde_yaml::from_str("bridge:\n  truncation: guess\n").unwrap();
        let err = apply_yaml(&mut config, yaml).unwrap_err();
        assert!(err.contains("Invalid truncation mode"));
    }

    #[test]
    fn test_yaml_layer_keeps_unset_values() {
        let mut config = ServerConfig::default();
        config.realtime.instructions = Some("from env".into());
        let yaml: YamlConfig = serde_yaml::from_str("realtime:\n  voice: echo\n").unwrap();
        apply_yaml(&mut config, yaml).unwrap();
        assert_eq!(config.realtime.voice, "echo");
        assert_eq!(config.realtime.instructions.as_deref(), Some("from env"));
    }
}
