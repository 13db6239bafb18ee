//! Checks run on the merged configuration before the server starts.

use super::ServerConfig;
use crate::core::bridge::TruncationMode;
use crate::core::realtime::openai::OpenAIRealtimeAudioFormat;

pub(super) fn validate(config: &ServerConfig) -> Result<(), String> {
    validate_realtime(config)?;
    validate_bridge(config)?;
    if let Some(tls) = &config.tls {
        validate_tls_files(&tls.cert_path, &tls.key_path)?;
    }
    Ok(())
}

fn validate_realtime(config: &ServerConfig) -> Result<(), String> {
    let realtime = &config.realtime;
    if url::Url::parse(&realtime.url).is_err() {
        return Err(format!("Invalid realtime url: {}", realtime.url));
    }
    if !(0.6..=1.2).contains(&realtime.temperature) {
        return Err(format!(
            "Realtime temperature must be between 0.6 and 1.2, got {}",
            realtime.temperature
        ));
    }
    let known_format = matches!(
        realtime.audio_format.to_lowercase().as_str(),
        "g711_ulaw" | "ulaw" | "mulaw" | "g711_alaw" | "alaw" | "pcm16" | "pcm" | "linear16"
    );
    if !known_format {
        return Err(format!(
            "Unsupported realtime audio format: {} (expected {}, {} or {})",
            realtime.audio_format,
            OpenAIRealtimeAudioFormat::G711Ulaw.as_str(),
            OpenAIRealtimeAudioFormat::G711Alaw.as_str(),
            OpenAIRealtimeAudioFormat::Pcm16.as_str(),
        ));
    }
    Ok(())
}

fn validate_bridge(config: &ServerConfig) -> Result<(), String> {
    let bridge = &config.bridge;
    if bridge.connect_timeout_ms == 0 {
        return Err("bridge.connect_timeout_ms must be greater than 0".to_string());
    }
    if bridge.max_call_duration_secs == 0 {
        return Err("bridge.max_call_duration_secs must be greater than 0".to_string());
    }
    if bridge.max_consecutive_frame_errors == 0 {
        return Err("bridge.max_consecutive_frame_errors must be greater than 0".to_string());
    }
    if bridge.max_pending_upstream_frames == 0 {
        return Err("bridge.max_pending_upstream_frames must be greater than 0".to_string());
    }
    if bridge.energy_threshold <= 0.0 || bridge.energy_min_frames == 0 {
        return Err("bridge energy threshold and min frames must be positive".to_string());
    }
    if bridge.truncation == TruncationMode::PlaybackMarks && !bridge.playback_marks {
        return Err(
            "bridge.truncation is playback_marks but bridge.playback_marks is disabled".to_string(),
        );
    }
    if bridge.max_concurrent_calls == Some(0) {
        return Err("max_concurrent_calls must be greater than 0".to_string());
    }
    Ok(())
}

fn validate_tls_files(cert: &std::path::Path, key: &std::path::Path) -> Result<(), String> {
    for (label, path) in [("certificate", cert), ("private key", key)] {
        if !path.exists() {
            return Err(format!("TLS {label} not found: {}", path.display()));
        }
    }
    Ok(())
}
