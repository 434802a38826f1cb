//! Voice pipeline integration tests
//!
//! Tests voice components without requiring audio hardware

mod common;

use std::io::Cursor;

use common::{MarkerWakeWord, loud_frame, marker_frame, silent_frame};
use loki_voice::voice::{
    CaptureMachine, CaptureState, EnergyWakeWord, FrameEvent, SAMPLE_RATE, VadSettings,
    WakeWordEngine, decode_audio, samples_to_ms, samples_to_wav, to_pcm16,
};

const FRAME: usize = 512;

/// Generate sine wave samples
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * amplitude
        })
        .collect()
}

fn machine_with(settings: VadSettings) -> CaptureMachine {
    CaptureMachine::new(
        Box::new(MarkerWakeWord {
            frame_length: FRAME,
        }),
        settings,
        SAMPLE_RATE,
    )
}

/// A machine that has just heard the wake word
fn recording_machine() -> CaptureMachine {
    let machine = machine_with(VadSettings::default());
    assert_eq!(
        machine.process_frame(&marker_frame(FRAME)),
        FrameEvent::WakeWordDetected(0)
    );
    assert_eq!(machine.state(), CaptureState::RecordingCommand);
    machine
}

fn feed(machine: &CaptureMachine, frame: &[f32], count: usize) -> FrameEvent {
    let mut last = FrameEvent::Idle;
    for _ in 0..count {
        last = machine.process_frame(frame);
    }
    last
}

#[test]
fn test_idle_until_wake_word() {
    let machine = machine_with(VadSettings::default());

    assert_eq!(feed(&machine, &loud_frame(FRAME), 20), FrameEvent::Idle);
    assert_eq!(machine.state(), CaptureState::AwaitingWakeWord);
    assert!(machine.take_command().is_none());
}

#[test]
fn test_trailing_silence_boundary_after_speech() {
    let machine = recording_machine();
    machine.process_frame(&loud_frame(FRAME));

    // Exactly at the limit keeps recording
    assert_eq!(
        feed(&machine, &silent_frame(FRAME), 40),
        FrameEvent::Recording
    );
    assert_eq!(machine.state(), CaptureState::RecordingCommand);

    // One more finishes the command
    assert_eq!(
        machine.process_frame(&silent_frame(FRAME)),
        FrameEvent::CommandReady
    );
    assert_eq!(machine.state(), CaptureState::ReadyToProcess);
}

#[test]
fn test_silence_boundary_without_speech() {
    let machine = recording_machine();

    assert_eq!(
        feed(&machine, &silent_frame(FRAME), 100),
        FrameEvent::Recording
    );
    assert_eq!(
        machine.process_frame(&silent_frame(FRAME)),
        FrameEvent::CommandReady
    );
}

#[test]
fn test_short_pause_does_not_end_command_before_speech() {
    let machine = recording_machine();

    // 50 silent frames would end a command that had speech, but not one that didn't
    assert_eq!(
        feed(&machine, &silent_frame(FRAME), 50),
        FrameEvent::Recording
    );

    machine.process_frame(&loud_frame(FRAME));
    assert_eq!(
        feed(&machine, &silent_frame(FRAME), 41),
        FrameEvent::CommandReady
    );
}

#[test]
fn test_speech_resets_silence_count() {
    let machine = recording_machine();
    machine.process_frame(&loud_frame(FRAME));

    feed(&machine, &silent_frame(FRAME), 35);
    machine.process_frame(&loud_frame(FRAME));
    assert_eq!(
        feed(&machine, &silent_frame(FRAME), 35),
        FrameEvent::Recording
    );
}

#[test]
fn test_max_command_length_cuts_off() {
    let machine = machine_with(VadSettings {
        max_command_ms: 100,
        ..VadSettings::default()
    });
    machine.process_frame(&marker_frame(FRAME));

    // 100ms at 16kHz is 1600 samples: the fourth 512-sample frame crosses it
    assert_eq!(feed(&machine, &loud_frame(FRAME), 3), FrameEvent::Recording);
    assert_eq!(
        machine.process_frame(&loud_frame(FRAME)),
        FrameEvent::CommandReady
    );
}

#[test]
fn test_take_command_moves_buffer() {
    let machine = recording_machine();
    feed(&machine, &loud_frame(FRAME), 10);

    // Not finished yet
    assert!(machine.take_command().is_none());

    let event = feed(&machine, &silent_frame(FRAME), 41);
    assert_eq!(event, FrameEvent::CommandReady);

    let command = machine.take_command().unwrap();
    assert_eq!(command.len(), 51 * FRAME);
    assert_eq!(machine.state(), CaptureState::AwaitingWakeWord);

    // Taken exactly once
    assert!(machine.take_command().is_none());
}

#[test]
fn test_frames_dropped_while_command_pending() {
    let machine = recording_machine();
    machine.process_frame(&loud_frame(FRAME));
    feed(&machine, &silent_frame(FRAME), 41);

    assert_eq!(machine.process_frame(&loud_frame(FRAME)), FrameEvent::Busy);
    assert_eq!(machine.process_frame(&marker_frame(FRAME)), FrameEvent::Busy);

    let command = machine.take_command().unwrap();
    assert_eq!(command.len(), 42 * FRAME);
}

#[test]
fn test_next_command_starts_fresh() {
    let machine = recording_machine();
    machine.process_frame(&loud_frame(FRAME));
    feed(&machine, &silent_frame(FRAME), 41);
    machine.take_command().unwrap();

    // Second command needs its own wake word and starts with an empty buffer
    assert_eq!(machine.process_frame(&loud_frame(FRAME)), FrameEvent::Idle);
    assert_eq!(
        machine.process_frame(&marker_frame(FRAME)),
        FrameEvent::WakeWordDetected(0)
    );
    machine.process_frame(&loud_frame(FRAME));
    feed(&machine, &silent_frame(FRAME), 41);
    assert_eq!(machine.take_command().unwrap().len(), 42 * FRAME);
}

#[test]
fn test_reset_abandons_command() {
    let machine = recording_machine();
    feed(&machine, &loud_frame(FRAME), 5);

    machine.reset();
    assert_eq!(machine.state(), CaptureState::AwaitingWakeWord);
    assert!(machine.take_command().is_none());
}

#[test]
fn test_energy_wake_word_with_sine() {
    let mut engine = EnergyWakeWord::new(FRAME, 0.05, 3).unwrap();
    let speech = generate_sine_samples(440.0, 0.5, 0.3);
    let mut pcm = Vec::new();

    let fired: Vec<Option<usize>> = speech
        .chunks_exact(FRAME)
        .take(3)
        .map(|frame| {
            to_pcm16(frame, &mut pcm);
            engine.process(&pcm)
        })
        .collect();

    assert_eq!(fired, vec![None, None, Some(0)]);
}

#[test]
fn test_energy_wake_word_ignores_quiet_audio() {
    let mut engine = EnergyWakeWord::new(FRAME, 0.05, 2).unwrap();
    let whisper = generate_sine_samples(440.0, 0.5, 0.01);
    let mut pcm = Vec::new();

    for frame in whisper.chunks_exact(FRAME) {
        to_pcm16(frame, &mut pcm);
        assert_eq!(engine.process(&pcm), None);
    }
}

#[test]
fn test_samples_to_ms() {
    assert_eq!(samples_to_ms(16_000, SAMPLE_RATE), 1000);
    assert_eq!(samples_to_ms(3_200, SAMPLE_RATE), 200);
    assert_eq!(samples_to_ms(100, 0), 0);
}

#[test]
fn test_samples_to_wav() {
    let samples = generate_sine_samples(440.0, 0.1, 0.5);
    let wav_data = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

    // Check WAV header magic
    assert_eq!(&wav_data[0..4], b"RIFF");
    assert_eq!(&wav_data[8..12], b"WAVE");

    // 44-byte header plus 16-bit samples
    assert_eq!(wav_data.len(), 44 + samples.len() * 2);
}

#[test]
fn test_wav_format() {
    let original_samples: Vec<f32> = vec![0.0, 0.5, -0.5, 1.0, -1.0, 0.25];
    let wav_data = samples_to_wav(&original_samples, SAMPLE_RATE).unwrap();

    let mut reader = hound::WavReader::new(Cursor::new(wav_data)).unwrap();

    let spec = reader.spec();
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.bits_per_sample, 16);

    let read_samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(read_samples[3], i16::MAX);
    assert_eq!(read_samples[4], -i16::MAX);
}

#[test]
fn test_decode_synthesized_wav() {
    let samples = vec![0.0, 0.25, -0.25, 0.5];
    let wav_data = samples_to_wav(&samples, 24_000).unwrap();

    let decoded = decode_audio(&wav_data).unwrap();
    assert_eq!(decoded.sample_rate, 24_000);
    assert_eq!(decoded.samples.len(), samples.len());
    for (got, want) in decoded.samples.iter().zip(&samples) {
        assert!((got - want).abs() < 1e-3, "{got} vs {want}");
    }
}

