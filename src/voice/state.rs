//! Wake word and voice-activity capture state machine
//!
//! The audio callback drives [`CaptureMachine::process_frame`] and a polling
//! consumer drains finished commands with [`CaptureMachine::take_command`].
//! One mutex guards all shared state; neither side holds it for longer than a
//! single frame's worth of work.

use std::sync::{Mutex, MutexGuard, PoisonError};

use super::wake_word::{WakeWordEngine, rms, to_pcm16};

/// Capture phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Feeding frames to the wake word engine
    AwaitingWakeWord,
    /// Appending frames to the command buffer until silence
    RecordingCommand,
    /// Command finished, waiting for the consumer to take it
    ReadyToProcess,
}

/// What a single frame did to the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEvent {
    /// No wake word in this frame
    Idle,
    /// Wake word fired with the given keyword index; recording started
    WakeWordDetected(usize),
    /// Frame appended to the command
    Recording,
    /// Frame appended and the command is now complete
    CommandReady,
    /// Previous command not yet taken; frame dropped
    Busy,
}

/// Voice-activity detection settings
#[derive(Debug, Clone, PartialEq)]
pub struct VadSettings {
    /// Frames with RMS below this count as silent
    pub threshold: f32,

    /// Trailing silent frames tolerated once speech has started
    pub silent_frames_after_speech: u32,

    /// Silent frames tolerated before giving up on a command that never started
    pub silent_frames_no_speech: u32,

    /// Commands shorter than this are discarded before transcription
    pub min_command_ms: u64,

    /// Recording is cut off at this length
    pub max_command_ms: u64,
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            threshold: 0.01,
            silent_frames_after_speech: 40,
            silent_frames_no_speech: 100,
            min_command_ms: 300,
            max_command_ms: 15_000,
        }
    }
}

struct Shared {
    state: CaptureState,
    engine: Box<dyn WakeWordEngine>,
    pcm: Vec<i16>,
    command: Vec<f32>,
    silent_frames: u32,
    speech_started: bool,
}

/// Shared capture state for the audio callback and the command consumer
pub struct CaptureMachine {
    shared: Mutex<Shared>,
    settings: VadSettings,
    sample_rate: u32,
    frame_length: usize,
    max_command_samples: usize,
}

impl CaptureMachine {
    /// Create a machine in the `AwaitingWakeWord` state
    ///
    /// Buffers are sized up front so the audio callback never grows them.
    #[must_use]
    pub fn new(engine: Box<dyn WakeWordEngine>, settings: VadSettings, sample_rate: u32) -> Self {
        let frame_length = engine.frame_length();
        let max_command_samples = duration_to_samples(settings.max_command_ms, sample_rate);

        Self {
            shared: Mutex::new(Shared {
                state: CaptureState::AwaitingWakeWord,
                engine,
                pcm: Vec::with_capacity(frame_length),
                command: Vec::with_capacity(max_command_samples + frame_length),
                silent_frames: 0,
                speech_started: false,
            }),
            settings,
            sample_rate,
            frame_length,
            max_command_samples,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Feed one frame from the audio callback
    pub fn process_frame(&self, frame: &[f32]) -> FrameEvent {
        let mut guard = self.lock();
        let shared = &mut *guard;

        match shared.state {
            CaptureState::AwaitingWakeWord => {
                to_pcm16(frame, &mut shared.pcm);
                match shared.engine.process(&shared.pcm) {
                    Some(index) => {
                        shared.state = CaptureState::RecordingCommand;
                        shared.command.clear();
                        shared.silent_frames = 0;
                        shared.speech_started = false;
                        FrameEvent::WakeWordDetected(index)
                    }
                    None => FrameEvent::Idle,
                }
            }
            CaptureState::RecordingCommand => {
                let room = (self.max_command_samples + self.frame_length)
                    .saturating_sub(shared.command.len());
                let take = frame.len().min(room);
                shared.command.extend_from_slice(&frame[..take]);

                if rms(frame) < self.settings.threshold {
                    shared.silent_frames = shared.silent_frames.saturating_add(1);
                } else {
                    shared.speech_started = true;
                    shared.silent_frames = 0;
                }

                let finished = if shared.speech_started {
                    shared.silent_frames > self.settings.silent_frames_after_speech
                } else {
                    shared.silent_frames > self.settings.silent_frames_no_speech
                };

                if finished || shared.command.len() >= self.max_command_samples {
                    shared.state = CaptureState::ReadyToProcess;
                    FrameEvent::CommandReady
                } else {
                    FrameEvent::Recording
                }
            }
            CaptureState::ReadyToProcess => FrameEvent::Busy,
        }
    }

    /// Take the finished command, if any, and return to `AwaitingWakeWord`
    ///
    /// The buffer is moved out, not copied. A replacement buffer is allocated
    /// before taking the lock.
    pub fn take_command(&self) -> Option<Vec<f32>> {
        if self.state() != CaptureState::ReadyToProcess {
            return None;
        }

        let replacement = Vec::with_capacity(self.max_command_samples + self.frame_length);

        let mut shared = self.lock();
        if shared.state != CaptureState::ReadyToProcess {
            return None;
        }

        let command = std::mem::replace(&mut shared.command, replacement);
        shared.state = CaptureState::AwaitingWakeWord;
        shared.silent_frames = 0;
        shared.speech_started = false;
        shared.engine.reset();
        drop(shared);

        Some(command)
    }

    /// Current phase
    #[must_use]
    pub fn state(&self) -> CaptureState {
        self.lock().state
    }

    /// Abandon any in-progress command and wait for the wake word again
    pub fn reset(&self) {
        let mut shared = self.lock();
        shared.state = CaptureState::AwaitingWakeWord;
        shared.command.clear();
        shared.silent_frames = 0;
        shared.speech_started = false;
        shared.engine.reset();
    }

    /// Skip the wake word and start recording immediately
    pub fn start_recording(&self) {
        let mut shared = self.lock();
        shared.state = CaptureState::RecordingCommand;
        shared.command.clear();
        shared.silent_frames = 0;
        shared.speech_started = false;
    }

    /// Samples per frame expected by the wake word engine
    #[must_use]
    pub const fn frame_length(&self) -> usize {
        self.frame_length
    }

    /// Capture sample rate
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// VAD settings in use
    #[must_use]
    pub const fn settings(&self) -> &VadSettings {
        &self.settings
    }
}

/// Duration in milliseconds of `samples` at `sample_rate`
#[must_use]
pub fn samples_to_ms(samples: usize, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    u64::try_from(samples)
        .unwrap_or(u64::MAX)
        .saturating_mul(1000)
        / u64::from(sample_rate)
}

fn duration_to_samples(ms: u64, sample_rate: u32) -> usize {
    let samples = ms.saturating_mul(u64::from(sample_rate)) / 1000;
    usize::try_from(samples).unwrap_or(usize::MAX / 2)
}
