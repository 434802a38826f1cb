//! Daemon - the main assistant service
//!
//! Orchestrates wake word capture, transcription, intent routing, agent
//! dispatch, and spoken responses. The cpal callback only feeds the
//! [`CaptureMachine`]; everything that blocks runs on the polling side.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::agents::{AgentRegistry, CalculationAgent, GeneralAgent, SystemControlAgent};
use crate::intent::{
    FastClassifier, HttpEmbedder, Intent, IntentRouter, LlmClassifier, OllamaClient, Outcome,
    RoutePath, TextGenerator, load_catalog,
};
use crate::voice::{
    AudioCapture, AudioPlayback, CaptureEvent, CaptureMachine, EnergyWakeWord, HttpSynthesizer,
    SpeechPriority, SpeechQueue, Synthesizer, Transcriber, WakeWordEngine, WhisperTranscriber,
    extract_command, samples_to_ms,
};
use crate::{Config, Result};

/// Spoken when a command could not be processed
pub const FAILURE_RESPONSE: &str = "Sorry, I didn't catch that.";

/// Spoken when the wake phrase arrives with no command after it
pub const ACKNOWLEDGE_RESPONSE: &str = "Yes?";

/// What happened to one captured command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// Shorter than the configured minimum; not transcribed
    TooShort {
        /// Command length
        duration_ms: u64,
    },
    /// Transcription came back empty
    NoSpeech,
    /// No wake phrase in the transcript; ignored silently
    NotAddressed {
        /// Transcribed text
        transcript: String,
    },
    /// Wake phrase with nothing after it
    Acknowledged,
    /// Classified and handled
    Responded {
        /// Command text with the wake phrase removed
        transcript: String,
        /// Final intent
        intent: Intent,
        /// Classifier that produced the intent
        path: RoutePath,
        /// Dispatch result
        outcome: Outcome,
    },
}

impl CommandOutcome {
    /// Text to speak, if any
    #[must_use]
    pub fn response(&self) -> Option<&str> {
        match self {
            Self::Responded { outcome, .. } => Some(outcome.response()),
            Self::Acknowledged => Some(ACKNOWLEDGE_RESPONSE),
            Self::TooShort { .. } | Self::NoSpeech | Self::NotAddressed { .. } => None,
        }
    }
}

/// Build the classification and dispatch pipeline
///
/// Loads the catalog, embeds it, and registers the built-in agents.
///
/// # Errors
///
/// Returns error if the catalog cannot be loaded, an endpoint is misconfigured,
/// or the catalog cannot be embedded
pub async fn build_router(config: &Config) -> Result<IntentRouter> {
    let embedder = Arc::new(HttpEmbedder::new(&config.embedding)?);
    let catalog = load_catalog(&config.intent.catalog_path)?;
    let fast =
        FastClassifier::build(&catalog, embedder, config.intent.similarity_threshold).await?;

    let generator: Arc<dyn TextGenerator> = Arc::new(OllamaClient::new(&config.llm)?);
    tracing::info!(model = %config.llm.model, host = %config.llm.host, "LLM client ready");
    let slow = LlmClassifier::new(Arc::clone(&generator));

    let mut agents = AgentRegistry::new();
    agents.register(Box::new(SystemControlAgent::host()));
    agents.register(Box::new(CalculationAgent::new()));
    agents.register(Box::new(GeneralAgent::new(generator)));

    Ok(IntentRouter::new(fast, slow, Arc::new(agents)).with_thresholds(
        config.intent.fast_accept_threshold,
        config.intent.dispatch_threshold,
    ))
}

/// The Loki daemon - listens, understands, and answers
pub struct Daemon {
    config: Config,
    machine: Arc<CaptureMachine>,
    transcriber: Arc<dyn Transcriber>,
    router: IntentRouter,
    speech: SpeechQueue,
}

impl Daemon {
    /// Create a new daemon instance
    ///
    /// Initializes, in order: wake word engine, transcriber, fast and slow
    /// classifiers, agents, synthesizer. Must be called inside a tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// Returns error if any component fails to initialize
    pub async fn new(config: Config) -> Result<Self> {
        let wake_word = EnergyWakeWord::new(
            config.audio.frame_length,
            config.wake_word.threshold,
            config.wake_word.trigger_frames,
        )?;
        tracing::info!(
            frame_length = config.audio.frame_length,
            trigger_frames = config.wake_word.trigger_frames,
            phrases = ?config.wake_word.phrases,
            "wake word engine ready"
        );

        let transcriber = Arc::new(WhisperTranscriber::new(
            &config.stt,
            config.audio.sample_rate,
        )?);

        let router = build_router(&config).await?;
        let synthesizer = Arc::new(HttpSynthesizer::new(&config.tts)?);

        Ok(Self::from_parts(
            config,
            Box::new(wake_word),
            transcriber,
            router,
            synthesizer,
        ))
    }

    /// Assemble a daemon from already-built components
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn from_parts(
        config: Config,
        wake_word: Box<dyn WakeWordEngine>,
        transcriber: Arc<dyn Transcriber>,
        router: IntentRouter,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        let machine = Arc::new(CaptureMachine::new(
            wake_word,
            config.vad.clone(),
            config.audio.sample_rate,
        ));
        let speech = SpeechQueue::spawn(synthesizer, config.tts.timeout);

        Self {
            config,
            machine,
            transcriber,
            router,
            speech,
        }
    }

    /// Shared capture state
    #[must_use]
    pub const fn machine(&self) -> &Arc<CaptureMachine> {
        &self.machine
    }

    /// Run until Ctrl-C
    ///
    /// # Errors
    ///
    /// Returns error if the audio devices cannot be opened
    #[allow(clippy::future_not_send)]
    pub async fn run(self) -> Result<()> {
        // cpal streams aren't Send, so the loop stays on this task
        let mut capture = AudioCapture::new(self.config.audio.sample_rate)?;
        let mut playback = if self.config.daemon.speak_responses {
            Some(AudioPlayback::new()?)
        } else {
            None
        };

        let (events_tx, mut events_rx) = mpsc::channel(16);
        capture.start(Arc::clone(&self.machine), events_tx)?;
        tracing::info!(
            agents = ?self.router.agents().names().collect::<Vec<_>>(),
            "listening for wake word"
        );

        let mut poll = tokio::time::interval(self.config.daemon.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "failed to listen for shutdown signal");
                    }
                    tracing::info!("shutdown requested");
                    break;
                }
                Some(event) = events_rx.recv() => match event {
                    CaptureEvent::WakeWordDetected(index) => {
                        tracing::info!(keyword = index, "wake word detected, recording command");
                    }
                    CaptureEvent::CommandReady => tracing::debug!("command recording finished"),
                },
                _ = poll.tick() => {
                    let reply = match self.machine.take_command() {
                        Some(samples) => self.respond(samples).await,
                        None => None,
                    };
                    if let Some((text, priority)) = reply {
                        self.speak(playback.as_mut(), &text, priority).await;
                    }
                }
            }
        }

        capture.stop();
        let dropped = self.speech.cancel_all();
        if dropped > 0 {
            tracing::debug!(dropped, "discarded pending speech");
        }

        Ok(())
    }

    /// Process a command buffer and pick the reply to speak, if any
    ///
    /// Processing errors are logged and answered with [`FAILURE_RESPONSE`]
    /// at high priority.
    pub async fn respond(&self, samples: Vec<f32>) -> Option<(String, SpeechPriority)> {
        match self.process_command(samples).await {
            Ok(outcome) => outcome
                .response()
                .map(|response| (response.to_string(), SpeechPriority::Normal)),
            Err(e) => {
                tracing::error!(error = %e, "command processing failed");
                Some((FAILURE_RESPONSE.to_string(), SpeechPriority::High))
            }
        }
    }

    /// Process one finished command buffer
    ///
    /// Commands shorter than `vad.min_command_ms` are discarded without
    /// transcription. Transcripts without a configured wake phrase are
    /// ignored; otherwise the phrase is stripped and the rest is routed.
    ///
    /// # Errors
    ///
    /// Returns error if transcription fails
    pub async fn process_command(&self, samples: Vec<f32>) -> Result<CommandOutcome> {
        let duration_ms = samples_to_ms(samples.len(), self.config.audio.sample_rate);

        if duration_ms < self.config.vad.min_command_ms {
            tracing::info!(
                duration_ms,
                min_ms = self.config.vad.min_command_ms,
                "command too short, discarding"
            );
            return Ok(CommandOutcome::TooShort { duration_ms });
        }

        tracing::debug!(duration_ms, "transcribing command");
        let transcript = self.transcriber.transcribe(&samples).await?;

        if transcript.trim().is_empty() {
            tracing::info!("no speech recognized");
            return Ok(CommandOutcome::NoSpeech);
        }

        let Some(command) = extract_command(&transcript, &self.config.wake_word.phrases) else {
            tracing::info!(transcript = %transcript, "wake phrase not heard, ignoring");
            return Ok(CommandOutcome::NotAddressed { transcript });
        };

        if command.is_empty() {
            tracing::info!("wake phrase without a command");
            return Ok(CommandOutcome::Acknowledged);
        }

        tracing::info!(command = %command, "command received");

        let routed = self.router.classify(&command).await;
        let outcome = self.router.dispatch(&routed.intent).await;

        tracing::info!(
            kind = %routed.intent.kind,
            action = %routed.intent.action,
            path = ?routed.path,
            response = %outcome.response(),
            "command handled"
        );

        Ok(CommandOutcome::Responded {
            transcript: command,
            intent: routed.intent,
            path: routed.path,
            outcome,
        })
    }

    /// Synthesize and play a response
    ///
    /// Waits until playback ends, so the next command is not taken before the
    /// reply is heard and the daemon never has more than one request queued.
    /// Failures are logged; the pipeline keeps running.
    #[allow(clippy::future_not_send)]
    async fn speak(
        &self,
        playback: Option<&mut AudioPlayback>,
        text: &str,
        priority: SpeechPriority,
    ) {
        let Some(playback) = playback else {
            tracing::info!(text, "response (speech disabled)");
            return;
        };

        tracing::debug!(text, "speaking");
        match self.speech.enqueue(text, priority).wait().await {
            Ok(audio) => {
                if let Err(e) = playback.play_audio(&audio).await {
                    tracing::warn!(error = %e, "playback failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "speech synthesis failed"),
        }
    }
}
