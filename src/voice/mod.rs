//! Voice processing module
//!
//! Handles audio capture, wake word detection, command capture, and playback.
//! STT and TTS go through OpenAI-compatible HTTP services.

mod capture;
mod playback;
mod speech_queue;
mod state;
mod stt;
mod tts;
mod wake_word;

pub use capture::{AudioCapture, CaptureEvent, SAMPLE_RATE, samples_to_wav};
pub use playback::{AudioPlayback, DecodedAudio, decode_audio};
pub use speech_queue::{SpeechPriority, SpeechQueue, SpeechTicket};
pub use state::{CaptureMachine, CaptureState, FrameEvent, VadSettings, samples_to_ms};
pub use stt::{Transcriber, WhisperTranscriber};
pub use tts::{HttpSynthesizer, Synthesizer};
pub use wake_word::{
    EnergyWakeWord, WakeWordEngine, extract_command, rms, sample_to_i16, to_pcm16,
};
