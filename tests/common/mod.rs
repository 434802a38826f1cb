//! Shared fakes for integration tests
//!
//! Nothing here touches audio hardware or the network.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use loki_voice::intent::{Embedder, TextGenerator};
use loki_voice::voice::{Synthesizer, Transcriber, WakeWordEngine};
use loki_voice::{Error, Result};

/// Dimension of [`BagOfWordsEmbedder`] vectors
pub const EMBEDDING_DIM: usize = 64;

/// Deterministic embedder that hashes each word into a bucket
///
/// Identical word multisets embed identically, so an exact catalog phrase
/// scores 1.0 against itself.
#[derive(Default)]
pub struct BagOfWordsEmbedder {
    calls: AtomicUsize,
}

impl BagOfWordsEmbedder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn bucket(word: &str) -> usize {
    // FNV-1a
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in word.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    usize::try_from(hash % EMBEDDING_DIM as u64).unwrap()
}

#[async_trait]
impl Embedder for BagOfWordsEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut vector = vec![0.0; EMBEDDING_DIM];
        for word in text.split_whitespace() {
            vector[bucket(word)] += 1.0;
        }
        Ok(vector)
    }
}

/// Generator that always returns the same response and counts calls
pub struct ScriptedGenerator {
    response: String,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(response: &str) -> Arc<Self> {
        Arc::new(Self {
            response: response.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, _system: &str, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

/// Transcriber returning a fixed transcript, or an error when `None`
pub struct ScriptedTranscriber {
    transcript: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedTranscriber {
    pub fn new(transcript: &str) -> Arc<Self> {
        Arc::new(Self {
            transcript: Some(transcript.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            transcript: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, _samples: &[f32]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.transcript
            .clone()
            .ok_or_else(|| Error::Stt("service unavailable".to_string()))
    }
}

/// Synthesizer that returns the text bytes as "audio"
#[derive(Default)]
pub struct EchoSynthesizer;

#[async_trait]
impl Synthesizer for EchoSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        Ok(text.as_bytes().to_vec())
    }
}

/// Wake engine that fires when the first sample of a frame is full scale
pub struct MarkerWakeWord {
    pub frame_length: usize,
}

impl WakeWordEngine for MarkerWakeWord {
    fn frame_length(&self) -> usize {
        self.frame_length
    }

    fn process(&mut self, pcm: &[i16]) -> Option<usize> {
        (pcm.first() == Some(&i16::MAX)).then_some(0)
    }
}

/// A frame that triggers [`MarkerWakeWord`]
pub fn marker_frame(frame_length: usize) -> Vec<f32> {
    let mut frame = vec![0.0; frame_length];
    frame[0] = 1.0;
    frame
}

/// A frame well above the default VAD threshold
pub fn loud_frame(frame_length: usize) -> Vec<f32> {
    vec![0.3; frame_length]
}

/// A frame of digital silence
pub fn silent_frame(frame_length: usize) -> Vec<f32> {
    vec![0.0; frame_length]
}
