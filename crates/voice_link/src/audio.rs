//! PCM16 little-endian frames carried as base64, the format the live audio
//! endpoint speaks in both directions.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub data_b64: String,
    pub mime_type: String,
}

impl AudioFrame {
    pub fn pcm(data_b64: impl Into<String>, sample_rate: u32) -> Self {
        Self {
            data_b64: data_b64.into(),
            mime_type: pcm_mime_type(sample_rate),
        }
    }
}

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("pcm16 payload has odd byte length {0}")]
    OddLength(usize),
}

pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={sample_rate}")
}

pub fn encode_pcm16(samples: &[f32], sample_rate: u32) -> AudioFrame {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        let scaled = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        bytes.extend_from_slice(&scaled.to_le_bytes());
    }
    AudioFrame::pcm(STANDARD.encode(bytes), sample_rate)
}

pub fn decode_pcm16(data_b64: &str) -> Result<Vec<f32>, AudioError> {
    let bytes = STANDARD.decode(data_b64)?;
    if bytes.len() % 2 != 0 {
        return Err(AudioError::OddLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect())
}

/// Mono playback length of `sample_count` samples.
pub fn playback_duration(sample_count: usize, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(sample_count as f64 / f64::from(sample_rate))
}

#[cfg(test)]
#[path = "tests/audio_tests.rs"]
mod tests;
