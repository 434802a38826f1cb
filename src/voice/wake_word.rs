//! Wake word detection
//!
//! Engines consume fixed-length 16-bit PCM frames on the audio thread and
//! report the index of a detected keyword. Implementations must not block,
//! perform I/O, or allocate per frame.
//!
//! An acoustic trigger only opens the microphone; the transcript must still
//! contain a wake phrase (see [`extract_command`]) before it is acted on.

use crate::{Error, Result};

/// A keyword spotter fed frame-by-frame from the capture callback
pub trait WakeWordEngine: Send {
    /// Number of samples the engine expects per frame
    fn frame_length(&self) -> usize;

    /// Process one frame, returning the detected keyword index
    fn process(&mut self, pcm: &[i16]) -> Option<usize>;

    /// Clear any internal history
    fn reset(&mut self) {}
}

/// Energy-triggered wake engine
///
/// Fires when `trigger_frames` consecutive frames exceed the RMS threshold.
/// Stands in for a trained keyword model; anything implementing
/// [`WakeWordEngine`] can replace it. Any loud sound fires it, so the
/// daemon confirms the wake phrase in the transcript.
#[derive(Debug, Clone)]
pub struct EnergyWakeWord {
    frame_length: usize,
    threshold: f32,
    trigger_frames: usize,
    loud_frames: usize,
}

impl EnergyWakeWord {
    /// Create a new energy wake engine
    ///
    /// # Errors
    ///
    /// Returns error if the frame length or trigger count is zero, or the
    /// threshold is outside (0, 1]
    pub fn new(frame_length: usize, threshold: f32, trigger_frames: usize) -> Result<Self> {
        if frame_length == 0 {
            return Err(Error::WakeWord("frame length must be non-zero".to_string()));
        }
        if trigger_frames == 0 {
            return Err(Error::WakeWord("trigger frame count must be non-zero".to_string()));
        }
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(Error::WakeWord(format!(
                "threshold must be in (0, 1], got {threshold}"
            )));
        }

        tracing::debug!(frame_length, threshold, trigger_frames, "energy wake engine initialized");

        Ok(Self {
            frame_length,
            threshold,
            trigger_frames,
            loud_frames: 0,
        })
    }
}

impl WakeWordEngine for EnergyWakeWord {
    fn frame_length(&self) -> usize {
        self.frame_length
    }

    fn process(&mut self, pcm: &[i16]) -> Option<usize> {
        if pcm_rms(pcm) > self.threshold {
            self.loud_frames += 1;
        } else {
            self.loud_frames = 0;
        }

        if self.loud_frames >= self.trigger_frames {
            self.loud_frames = 0;
            return Some(0);
        }

        None
    }

    fn reset(&mut self) {
        self.loud_frames = 0;
    }
}

/// Find a wake phrase in a transcript and return the command after it
///
/// Matching is case-insensitive and ignores punctuation attached to words,
/// so "Hey, Loki!" matches the phrase "hey loki". The earliest match wins,
/// and the longest phrase at that position. Anything before the phrase is
/// dropped. With no phrases configured the whole transcript is the command.
///
/// Returns `None` if no phrase is present. The command may be empty when
/// the phrase was said on its own.
#[must_use]
pub fn extract_command(transcript: &str, phrases: &[String]) -> Option<String> {
    if phrases.is_empty() {
        return Some(transcript.trim().to_string());
    }

    let words: Vec<&str> = transcript.split_whitespace().collect();
    let cleaned: Vec<String> = words.iter().map(|word| clean_word(word)).collect();
    let phrases: Vec<Vec<String>> = phrases
        .iter()
        .map(|phrase| phrase.split_whitespace().map(clean_word).collect::<Vec<_>>())
        .filter(|phrase| !phrase.is_empty())
        .collect();

    let (start, len) = (0..cleaned.len()).find_map(|start| {
        phrases
            .iter()
            .filter(|phrase| cleaned[start..].starts_with(phrase))
            .map(Vec::len)
            .max()
            .map(|len| (start, len))
    })?;

    let command = words[start + len..].join(" ");
    Some(
        command
            .trim_start_matches(|c: char| !c.is_alphanumeric())
            .trim()
            .to_string(),
    )
}

fn clean_word(word: &str) -> String {
    word.trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

/// Calculate RMS energy of f32 audio samples
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// RMS of 16-bit PCM, normalized to the f32 [0, 1] scale
#[allow(clippy::cast_precision_loss)]
fn pcm_rms(pcm: &[i16]) -> f32 {
    if pcm.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = pcm
        .iter()
        .map(|&s| {
            let v = f32::from(s) / 32768.0;
            v * v
        })
        .sum();
    (sum_squares / pcm.len() as f32).sqrt()
}

/// Convert f32 [-1.0, 1.0] samples into 16-bit PCM, reusing `out`
pub fn to_pcm16(samples: &[f32], out: &mut Vec<i16>) {
    out.clear();
    out.extend(samples.iter().map(|&s| sample_to_i16(s)));
}

/// Convert one f32 [-1.0, 1.0] sample to i16
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn sample_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_energy_calculation() {
        let silence = vec![0.0f32; 100];
        assert!(rms(&silence) < 0.001);

        let loud = vec![0.5f32; 100];
        assert!(rms(&loud) > 0.4);

        assert!(rms(&[]).abs() < f32::EPSILON);
    }

    #[test]
    fn test_pcm_conversion_clamps() {
        let mut out = Vec::new();
        to_pcm16(&[0.0, 1.0, -1.0, 2.0, -2.0], &mut out);
        assert_eq!(out, vec![0, 32767, -32767, 32767, -32768]);
    }

    #[test]
    fn test_energy_wake_word_needs_consecutive_frames() {
        let mut engine = EnergyWakeWord::new(4, 0.1, 3).unwrap();
        let loud = [16000i16; 4];
        let quiet = [0i16; 4];

        assert_eq!(engine.process(&loud), None);
        assert_eq!(engine.process(&loud), None);
        assert_eq!(engine.process(&quiet), None);
        assert_eq!(engine.process(&loud), None);
        assert_eq!(engine.process(&loud), None);
        assert_eq!(engine.process(&loud), Some(0));

        // Counter restarts after firing
        assert_eq!(engine.process(&loud), None);
    }

    fn phrases() -> Vec<String> {
        vec!["hey loki".to_string(), "loki".to_string()]
    }

    #[test]
    fn test_extract_command_strips_phrase() {
        assert_eq!(
            extract_command("Hey Loki, what time is it?", &phrases()).as_deref(),
            Some("what time is it?")
        );
        assert_eq!(
            extract_command("okay LOKI: open the browser", &phrases()).as_deref(),
            Some("open the browser")
        );
        assert_eq!(
            extract_command("Hey, Loki! Turn it up.", &phrases()).as_deref(),
            Some("Turn it up.")
        );
    }

    #[test]
    fn test_extract_command_requires_phrase() {
        assert_eq!(extract_command("what time is it", &phrases()), None);
        // Whole words only
        assert_eq!(extract_command("lokis are everywhere", &phrases()), None);
        assert_eq!(extract_command("", &phrases()), None);
    }

    #[test]
    fn test_extract_command_phrase_alone_is_empty() {
        assert_eq!(extract_command("Hey Loki.", &phrases()).as_deref(), Some(""));
    }

    #[test]
    fn test_extract_command_without_phrases_passes_through() {
        assert_eq!(
            extract_command("  what time is it ", &[]).as_deref(),
            Some("what time is it")
        );
    }

    #[test]
    fn test_energy_wake_word_rejects_bad_settings() {
        assert!(EnergyWakeWord::new(0, 0.1, 3).is_err());
        assert!(EnergyWakeWord::new(512, 0.0, 3).is_err());
        assert!(EnergyWakeWord::new(512, 0.1, 0).is_err());
    }
}
