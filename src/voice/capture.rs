//! Audio capture from microphone
//!
//! The cpal callback re-chunks device buffers into fixed-length mono frames
//! and hands each frame to the [`CaptureMachine`].

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use tokio::sync::mpsc;

use super::state::{CaptureMachine, FrameEvent};
use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Notifications sent from the audio thread to the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Wake word fired; recording a command
    WakeWordDetected(usize),
    /// Command recording finished
    CommandReady,
}

/// Captures audio from the default input device
pub struct AudioCapture {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Open the default input device at the given sample rate
    ///
    /// Mono configurations are preferred; multi-channel input is downmixed.
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new(sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let supports_rate = |c: &cpal::SupportedStreamConfigRange| {
            c.sample_format() == cpal::SampleFormat::F32
                && c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        };

        let mut candidates: Vec<_> = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .filter(|c| supports_rate(c))
            .collect();
        candidates.sort_by_key(cpal::SupportedStreamConfigRange::channels);

        let supported_config = candidates
            .into_iter()
            .next()
            .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(sample_rate))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels = config.channels,
            "audio capture initialized"
        );

        Ok(Self {
            device,
            config,
            stream: None,
        })
    }

    /// Start feeding frames into the capture machine
    ///
    /// Wake word and command-ready notifications are sent with `try_send`;
    /// a full channel drops the notification rather than blocking.
    ///
    /// # Errors
    ///
    /// Returns error if the stream cannot be started
    pub fn start(
        &mut self,
        machine: Arc<CaptureMachine>,
        events: mpsc::Sender<CaptureEvent>,
    ) -> Result<()> {
        let mut frame = Vec::with_capacity(machine.frame_length());
        let frame_length = machine.frame_length();

        self.start_with(move |mono: f32| {
            frame.push(mono);
            if frame.len() < frame_length {
                return;
            }

            let event = match machine.process_frame(&frame) {
                FrameEvent::WakeWordDetected(index) => Some(CaptureEvent::WakeWordDetected(index)),
                FrameEvent::CommandReady => Some(CaptureEvent::CommandReady),
                FrameEvent::Idle | FrameEvent::Recording | FrameEvent::Busy => None,
            };
            frame.clear();

            if let Some(event) = event {
                let _ = events.try_send(event);
            }
        })
    }

    /// Start capturing, calling `on_sample` for every mono sample
    ///
    /// # Errors
    ///
    /// Returns error if capture fails
    pub fn start_with<F>(&mut self, mut on_sample: F) -> Result<()>
    where
        F: FnMut(f32) + Send + 'static,
    {
        if self.stream.is_some() {
            return Ok(());
        }

        let channels = usize::from(self.config.channels.max(1));

        #[allow(clippy::cast_precision_loss)]
        let scale = 1.0 / channels as f32;

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    for chunk in data.chunks(channels) {
                        on_sample(chunk.iter().sum::<f32>() * scale);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    /// Stop capturing audio
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }

    /// Get the sample rate
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }
}

/// Convert f32 samples to WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(super::wake_word::sample_to_i16(sample))
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
