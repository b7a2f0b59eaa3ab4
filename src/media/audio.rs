//! Host-side audio decoding for speech inputs
//!
//! Speech models expect 16 kHz mono f32. Staged audio is decoded and
//! resampled before the run request is sent to the worker.

use std::io::Cursor;
use std::path::Path;

use hound::{SampleFormat, WavReader};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkbenchError};

/// Sample rate expected by speech recognition pipelines
pub const SPEECH_SAMPLE_RATE: u32 = 16_000;

/// Mono audio samples
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl std::fmt::Debug for AudioClip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioClip")
            .field("samples", &self.samples.len())
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

impl AudioClip {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Linear-interpolation resample
    pub fn resampled(&self, target_rate: u32) -> AudioClip {
        if self.sample_rate == target_rate || self.samples.is_empty() || self.sample_rate == 0 {
            return AudioClip {
                samples: self.samples.clone(),
                sample_rate: target_rate,
            };
        }

        let ratio = self.sample_rate as f64 / target_rate as f64;
        let out_len = ((self.samples.len() as f64) / ratio).round() as usize;
        let last = self.samples.len() - 1;
        let samples = (0..out_len)
            .map(|i| {
                let pos = i as f64 * ratio;
                let idx = pos.floor() as usize;
                let frac = (pos - idx as f64) as f32;
                let a = self.samples[idx.min(last)];
                let b = self.samples[(idx + 1).min(last)];
                a + (b - a) * frac
            })
            .collect();

        AudioClip {
            samples,
            sample_rate: target_rate,
        }
    }
}

/// Decode a WAV byte buffer into a mono clip (channels averaged)
pub fn decode_wav(bytes: &[u8]) -> Result<AudioClip> {
    let reader = WavReader::new(Cursor::new(bytes)).map_err(|e| WorkbenchError::InvalidAudio {
        reason: e.to_string(),
    })?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| WorkbenchError::InvalidAudio {
                reason: e.to_string(),
            })?,
        SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| WorkbenchError::InvalidAudio {
                    reason: e.to_string(),
                })?
        }
    };

    let samples = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();

    Ok(AudioClip {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Loads staged media referenced by URL/path
pub trait MediaLoader: Send + Sync {
    /// Load audio ready for a speech pipeline (mono, 16 kHz)
    fn load_audio(&self, url: &str) -> Result<AudioClip>;
}

/// Loads audio from local file paths (`file://` prefix accepted)
#[derive(Debug, Clone, Default)]
pub struct FileMediaLoader;

impl MediaLoader for FileMediaLoader {
    fn load_audio(&self, url: &str) -> Result<AudioClip> {
        let path = Path::new(url.strip_prefix("file://").unwrap_or(url));
        let bytes = std::fs::read(path).map_err(|e| WorkbenchError::FileReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(decode_wav(&bytes)?.resampled(SPEECH_SAMPLE_RATE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    fn wav_bytes(sample_rate: u32, channels: u16, frames: usize) -> Vec<u8> {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..frames {
                for _ in 0..channels {
                    writer.write_sample(((i % 100) as i16) * 100).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_decode_stereo_downmixes() {
        let clip = decode_wav(&wav_bytes(44_100, 2, 441)).unwrap();
        assert_eq!(clip.sample_rate, 44_100);
        assert_eq!(clip.samples.len(), 441);
    }

    #[test]
    fn test_resample_to_speech_rate() {
        let clip = decode_wav(&wav_bytes(48_000, 1, 48_000)).unwrap();
        let resampled = clip.resampled(SPEECH_SAMPLE_RATE);
        assert_eq!(resampled.sample_rate, SPEECH_SAMPLE_RATE);
        assert_eq!(resampled.samples.len(), 16_000);
        approx::assert_abs_diff_eq!(resampled.duration_secs(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode_wav(b"not a wav file").unwrap_err();
        assert_eq!(err.error_code(), "INVALID_AUDIO");
    }
}
