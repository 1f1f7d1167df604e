//! Relay configuration with environment overrides.

use serde::{Deserialize, Serialize};

/// Configuration for the relay server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `8081`).
    pub port: u16,
    /// Status broadcast interval in seconds.
    pub status_interval_secs: u64,
    /// Outbound channel capacity per connection.
    pub outbound_capacity: usize,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Max retained event-log entries.
    pub max_retained_logs: usize,
    /// Upstream session settings.
    pub upstream: UpstreamConfig,
}

/// Settings for the upstream realtime session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// WebSocket endpoint of the upstream API.
    pub endpoint: String,
    /// Model identifier appended to the endpoint.
    pub model: String,
    /// Voice id for synthesized audio.
    pub voice: String,
    /// System instructions applied at connect.
    pub instructions: String,
    /// Input transcription model.
    pub transcription_model: String,
    /// Input audio format.
    pub input_audio_format: String,
    /// Turn detection mode (`none` for manual commit, `server_vad` for
    /// voice activity detection).
    pub turn_detection: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8081,
            status_interval_secs: 5,
            outbound_capacity: 64,
            max_message_size: 2 * 1024 * 1024, // 2 MB
            max_retained_logs: 1000,
            upstream: UpstreamConfig::default(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://api.openai.com/v1/realtime".into(),
            model: "gpt-4o-realtime-preview".into(),
            voice: "alloy".into(),
            instructions: String::new(),
            transcription_model: "whisper-1".into(),
            input_audio_format: "pcm16".into(),
            turn_detection: "none".into(),
        }
    }
}

impl ServerConfig {
    /// Apply `SWITCHBOARD_*` environment overrides on top of the current
    /// values. Invalid values are logged and ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = read_env_string("SWITCHBOARD_HOST") {
            self.host = v;
        }
        if let Some(v) = read_env_u16("SWITCHBOARD_PORT", 1, 65535) {
            self.port = v;
        }
        if let Some(v) = read_env_u64("SWITCHBOARD_STATUS_INTERVAL_SECS", 1, 3600) {
            self.status_interval_secs = v;
        }
        if let Some(v) = read_env_usize("SWITCHBOARD_OUTBOUND_CAPACITY", 1, 65536) {
            self.outbound_capacity = v;
        }
        if let Some(v) = read_env_usize("SWITCHBOARD_MAX_MESSAGE_SIZE", 1024, 64 * 1024 * 1024) {
            self.max_message_size = v;
        }
        if let Some(v) = read_env_usize("SWITCHBOARD_MAX_LOGS", 1, 1_000_000) {
            self.max_retained_logs = v;
        }
        if let Some(v) = read_env_string("SWITCHBOARD_UPSTREAM_URL") {
            self.upstream.endpoint = v;
        }
        if let Some(v) = read_env_string("SWITCHBOARD_MODEL") {
            self.upstream.model = v;
        }
        if let Some(v) = read_env_string("SWITCHBOARD_VOICE") {
            self.upstream.voice = v;
        }
        if let Some(v) = read_env_string("SWITCHBOARD_INSTRUCTIONS") {
            self.upstream.instructions = v;
        }
        if let Some(v) = read_env_string("SWITCHBOARD_TURN_DETECTION") {
            self.upstream.turn_detection = v;
        }
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid numeric env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid numeric env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid numeric env var, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bind() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 8081);
    }

    #[test]
    fn default_status_interval() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.status_interval_secs, 5);
    }

    #[test]
    fn default_upstream() {
        let cfg = UpstreamConfig::default();
        assert_eq!(cfg.voice, "alloy");
        assert_eq!(cfg.transcription_model, "whisper-1");
        assert_eq!(cfg.input_audio_format, "pcm16");
        assert_eq!(cfg.turn_detection, "none");
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.host, cfg.host);
        assert_eq!(back.port, cfg.port);
        assert_eq!(back.upstream.model, cfg.upstream.model);
    }

    #[test]
    fn parse_u16_in_range() {
        assert_eq!(parse_u16_range("8081", 1, 65535), Some(8081));
    }

    #[test]
    fn parse_u16_out_of_range() {
        assert_eq!(parse_u16_range("0", 1, 65535), None);
    }

    #[test]
    fn parse_u16_not_a_number() {
        assert_eq!(parse_u16_range("eight", 1, 65535), None);
    }

    #[test]
    fn parse_u64_bounds_inclusive() {
        assert_eq!(parse_u64_range("1", 1, 3600), Some(1));
        assert_eq!(parse_u64_range("3600", 1, 3600), Some(3600));
        assert_eq!(parse_u64_range("3601", 1, 3600), None);
    }

    #[test]
    fn parse_usize_rejects_negative() {
        assert_eq!(parse_usize_range("-5", 1, 100), None);
    }
}
