//! Per-connection audio chunk buffering and WAV assembly.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use base64::Engine;
use parking_lot::Mutex;
use serde_json::json;
use tracing::debug;

use switchboard_core::errors::{RelayError, Result};
use switchboard_core::log::EventLog;

/// Sample rate of the console audio stream.
pub const SAMPLE_RATE: u32 = 24_000;

/// Buffers raw PCM16 chunks per console connection and assembles them
/// into a WAV recording on commit.
pub struct AudioAssembler {
    buffers: Mutex<HashMap<String, Vec<i16>>>,
    log: Arc<EventLog>,
}

impl AudioAssembler {
    /// Create an assembler that logs recordings to the given event log.
    pub fn new(log: Arc<EventLog>) -> Self {
        Self {
            buffers: Mutex::new(HashMap::new()),
            log,
        }
    }

    /// Append samples for a connection, in arrival order.
    pub fn append(&self, connection_id: &str, samples: &[i16]) {
        let mut buffers = self.buffers.lock();
        buffers
            .entry(connection_id.to_owned())
            .or_default()
            .extend_from_slice(samples);
    }

    /// Number of buffered samples for a connection.
    pub fn buffered(&self, connection_id: &str) -> usize {
        self.buffers
            .lock()
            .get(connection_id)
            .map_or(0, Vec::len)
    }

    /// Finalize the buffered audio for a connection.
    ///
    /// Concatenates the chunks, encodes a mono 16-bit WAV, logs it as a
    /// base64 `client.audio_recording` entry, and clears the buffer.
    /// Returns `None` (a logged no-op) when nothing is buffered, which
    /// also covers a repeated commit.
    pub fn commit(&self, connection_id: &str) -> Result<Option<Vec<u8>>> {
        let samples = {
            let mut buffers = self.buffers.lock();
            buffers.remove(connection_id).unwrap_or_default()
        };
        if samples.is_empty() {
            debug!(conn_id = connection_id, "audio commit with empty buffer");
            self.log.log(
                "client",
                "audio_commit_empty",
                json!({"connectionId": connection_id}),
            );
            return Ok(None);
        }
        let wav = encode_wav(&samples)?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&wav);
        self.log.log(
            "client",
            "audio_recording",
            json!({
                "connectionId": connection_id,
                "sampleRate": SAMPLE_RATE,
                "samples": samples.len(),
                "audio": encoded,
            }),
        );
        Ok(Some(wav))
    }

    /// Drop any buffered audio for a disconnected connection.
    pub fn remove(&self, connection_id: &str) {
        let _ = self.buffers.lock().remove(connection_id);
    }
}

/// Encode samples as a mono, 16-bit, 24 kHz WAV file in memory.
fn encode_wav(samples: &[i16]) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec)
        .map_err(|e| RelayError::AudioEncode(e.to_string()))?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| RelayError::AudioEncode(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| RelayError::AudioEncode(e.to_string()))?;
    Ok(cursor.into_inner())
}
