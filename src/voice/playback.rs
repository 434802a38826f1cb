//! Audio playback to speakers

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};

use crate::{Error, Result};

/// Decoded mono audio
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// Mono samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

/// Plays audio to the default output device
pub struct AudioPlayback {
    device: Device,
}

impl AudioPlayback {
    /// Create a new audio playback instance
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            "audio playback initialized"
        );

        Ok(Self { device })
    }

    /// Play synthesized audio (WAV or MP3 bytes)
    ///
    /// # Errors
    ///
    /// Returns error if decoding or playback fails
    #[allow(clippy::unused_async)]
    pub async fn play_audio(&mut self, audio: &[u8]) -> Result<()> {
        let decoded = decode_audio(audio)?;
        self.play_samples_blocking(&decoded.samples, decoded.sample_rate)
    }

    /// Play mono f32 samples
    ///
    /// # Errors
    ///
    /// Returns error if playback fails
    #[allow(clippy::unused_async)]
    pub async fn play(&mut self, samples: Vec<f32>, sample_rate: u32) -> Result<()> {
        self.play_samples_blocking(&samples, sample_rate)
    }

    fn output_config(&self, sample_rate: u32) -> Result<StreamConfig> {
        let supports_rate = |c: &cpal::SupportedStreamConfigRange, channels: u16| {
            c.channels() == channels
                && c.sample_format() == cpal::SampleFormat::F32
                && c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        };

        let supported_config = self
            .device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| supports_rate(c, 1))
            .or_else(|| {
                // Fallback: try stereo
                self.device
                    .supported_output_configs()
                    .ok()?
                    .find(|c| supports_rate(c, 2))
            })
            .ok_or_else(|| {
                Error::Audio(format!("no output config supports {sample_rate} Hz"))
            })?;

        Ok(supported_config
            .with_sample_rate(SampleRate(sample_rate))
            .config())
    }

    /// Play samples in a blocking manner
    fn play_samples_blocking(&self, samples: &[f32], sample_rate: u32) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let config = self.output_config(sample_rate)?;
        let channels = usize::from(config.channels);

        let shared: Arc<[f32]> = Arc::from(samples);
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = {
            let shared = Arc::clone(&shared);
            let position = Arc::clone(&position);
            let finished = Arc::clone(&finished);

            self.device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut pos = position.load(Ordering::Relaxed);

                        for frame in data.chunks_mut(channels) {
                            let sample = shared.get(pos).copied().unwrap_or_else(|| {
                                finished.store(true, Ordering::Release);
                                0.0
                            });

                            for out in frame.iter_mut() {
                                *out = sample;
                            }

                            if pos < shared.len() {
                                pos += 1;
                            }
                        }

                        position.store(pos, Ordering::Relaxed);
                    },
                    |err| {
                        tracing::error!(error = %err, "audio playback error");
                    },
                    None,
                )
                .map_err(|e| Error::Audio(e.to_string()))?
        };

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        // Wait for playback to finish
        let duration_ms = u64::try_from(samples.len()).unwrap_or(u64::MAX).saturating_mul(1000)
            / u64::from(sample_rate.max(1));

        let start = Instant::now();
        let timeout = Duration::from_millis(duration_ms.saturating_add(500));

        while !finished.load(Ordering::Acquire) {
            if start.elapsed() > timeout {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        // Small delay to ensure audio finishes
        std::thread::sleep(Duration::from_millis(100));

        drop(stream);
        tracing::debug!(samples = samples.len(), sample_rate, "playback complete");

        Ok(())
    }
}

/// Decode synthesized audio, detecting WAV by its RIFF header and
/// otherwise treating the bytes as MP3
///
/// # Errors
///
/// Returns error if the bytes cannot be decoded
pub fn decode_audio(audio: &[u8]) -> Result<DecodedAudio> {
    if audio.starts_with(b"RIFF") {
        decode_wav(audio)
    } else {
        decode_mp3(audio)
    }
}

/// Decode WAV bytes to mono f32 samples
#[allow(clippy::cast_precision_loss)]
fn decode_wav(wav_data: &[u8]) -> Result<DecodedAudio> {
    let mut reader =
        hound::WavReader::new(Cursor::new(wav_data)).map_err(|e| Error::Audio(e.to_string()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Audio(format!("WAV decode error: {e}")))?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Audio(format!("WAV decode error: {e}")))?
        }
    };

    Ok(DecodedAudio {
        samples: downmix(&interleaved, channels),
        sample_rate: spec.sample_rate,
    })
}

/// Decode MP3 bytes to mono f32 samples
fn decode_mp3(mp3_data: &[u8]) -> Result<DecodedAudio> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = 0;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate = u32::try_from(frame.sample_rate).unwrap_or(sample_rate);
                let channels = frame.channels.max(1);
                let pcm: Vec<f32> = frame.data.iter().map(|&s| f32::from(s) / 32768.0).collect();
                samples.extend(downmix(&pcm, channels));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    if sample_rate == 0 {
        return Err(Error::Audio("MP3 contained no audio frames".to_string()));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

/// Average interleaved channels down to mono
#[allow(clippy::cast_precision_loss)]
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }

    interleaved
        .chunks(channels)
        .map(|chunk| chunk.iter().sum::<f32>() / chunk.len() as f32)
        .collect()
}
