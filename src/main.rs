use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use loki_voice::daemon::build_router;
use loki_voice::voice::{AudioCapture, AudioPlayback, HttpSynthesizer, Synthesizer};
use loki_voice::{Config, Daemon};

/// Loki - wake word voice assistant
#[derive(Parser)]
#[command(name = "loki", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/loki/config.toml)
    #[arg(short, long, env = "LOKI_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
    /// Classify typed text and run the matching agent
    Classify {
        /// Command text, as it would come out of transcription
        text: String,
    },
    /// Print the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,loki_voice=info",
        1 => "info,loki_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();

    // Handle subcommands
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(config_path, duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::TestTts { text } => test_tts(config_path, &text).await,
            Command::Classify { text } => classify(config_path, &text).await,
            Command::ShowConfig => show_config(config_path),
        };
    }

    tracing::info!(config = ?cli.config, "starting loki");

    // Load configuration
    let config = Config::load(config_path)?;
    tracing::debug!(
        catalog = %config.intent.catalog_path.display(),
        model = %config.llm.model,
        "loaded configuration"
    );

    // Create and run daemon
    let daemon = Daemon::new(config).await?;
    tracing::info!("loki ready");

    // Run until interrupted
    daemon.run().await?;

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(config_path: Option<&std::path::Path>, duration: u64) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;

    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    // (sum of squares, count, peak) for the current second
    let stats = Arc::new(Mutex::new((0.0_f64, 0_usize, 0.0_f32)));

    let mut capture = AudioCapture::new(config.audio.sample_rate)?;
    {
        let stats = Arc::clone(&stats);
        capture.start_with(move |sample| {
            if let Ok(mut s) = stats.lock() {
                s.0 += f64::from(sample * sample);
                s.1 += 1;
                s.2 = s.2.max(sample.abs());
            }
        })?;
    }

    println!("Sample rate: {} Hz", capture.sample_rate());
    println!("VAD threshold: {:.4}", config.vad.threshold);
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let (sum, count, peak) = stats
            .lock()
            .map(|mut s| std::mem::replace(&mut *s, (0.0, 0, 0.0)))
            .unwrap_or((0.0, 0, 0.0));

        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
        let energy = if count == 0 {
            0.0
        } else {
            (sum / count as f64).sqrt() as f32
        };

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);
        let speech = if energy < config.vad.threshold { "silent" } else { "speech" };

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | {speech} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");
    println!("  4. Try: pavucontrol (to check levels)");

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let mut playback = AudioPlayback::new()?;

    // 2 seconds of 440Hz sine wave at 24kHz
    let sample_rate = 24_000_u32;
    let frequency = 440.0_f32;
    let num_samples = usize::try_from(sample_rate * 2)?;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);

    playback.play(samples, sample_rate).await?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}

/// Test TTS output
async fn test_tts(config_path: Option<&std::path::Path>, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load(config_path)?;
    let synthesizer = HttpSynthesizer::new(&config.tts)?;

    println!("Synthesizing speech...");
    let audio = tokio::time::timeout(config.tts.timeout, synthesizer.synthesize(text))
        .await
        .map_err(|_| anyhow::anyhow!("TTS synthesis timed out"))??;
    println!("Got {} bytes of audio data", audio.len());

    println!("Playing audio...");
    let mut playback = AudioPlayback::new()?;
    playback.play_audio(&audio).await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}

/// Classify typed text and dispatch it
async fn classify(config_path: Option<&std::path::Path>, text: &str) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;
    let router = build_router(&config).await?;

    let routed = router.classify(text).await;
    let outcome = router.dispatch(&routed.intent).await;

    println!("Path:     {:?}", routed.path);
    println!("Intent:   {}", serde_json::to_string_pretty(&routed.intent)?);
    println!("Response: {}", outcome.response());

    Ok(())
}

/// Print the effective configuration, with credentials redacted
fn show_config(config_path: Option<&std::path::Path>) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;
    let key = |k: &Option<String>| if k.is_some() { "set" } else { "unset" };

    let path = config_path
        .map(std::path::Path::to_path_buf)
        .or_else(loki_voice::config::file::config_file_path);
    if let Some(path) = path {
        println!("config file:                     {}", path.display());
    }
    println!("audio.sample_rate:               {}", config.audio.sample_rate);
    println!("audio.frame_length:              {}", config.audio.frame_length);
    println!("vad.threshold:                   {}", config.vad.threshold);
    println!("vad.silent_frames_after_speech:  {}", config.vad.silent_frames_after_speech);
    println!("vad.silent_frames_no_speech:     {}", config.vad.silent_frames_no_speech);
    println!("vad.min_command_ms:              {}", config.vad.min_command_ms);
    println!("vad.max_command_ms:              {}", config.vad.max_command_ms);
    println!("wake_word.threshold:             {}", config.wake_word.threshold);
    println!("wake_word.trigger_frames:        {}", config.wake_word.trigger_frames);
    println!("wake_word.phrases:               {}", config.wake_word.phrases.join(", "));
    println!("intent.catalog_path:             {}", config.intent.catalog_path.display());
    println!("intent.similarity_threshold:     {}", config.intent.similarity_threshold);
    println!("intent.fast_accept_threshold:    {}", config.intent.fast_accept_threshold);
    println!("intent.dispatch_threshold:       {}", config.intent.dispatch_threshold);
    println!("llm.host:                        {}", config.llm.host);
    println!("llm.model:                       {}", config.llm.model);
    println!("llm.num_ctx:                     {}", config.llm.num_ctx);
    println!("llm.max_tokens:                  {}", config.llm.max_tokens);
    println!("embedding.base_url:              {}", config.embedding.base_url);
    println!("embedding.model:                 {}", config.embedding.model);
    println!("embedding.api_key:               {}", key(&config.embedding.api_key));
    println!("stt.base_url:                    {}", config.stt.base_url);
    println!("stt.model:                       {}", config.stt.model);
    println!("stt.api_key:                     {}", key(&config.stt.api_key));
    println!("tts.base_url:                    {}", config.tts.service.base_url);
    println!("tts.model:                       {}", config.tts.service.model);
    println!("tts.api_key:                     {}", key(&config.tts.service.api_key));
    println!("tts.voice:                       {}", config.tts.voice);
    println!("tts.speed:                       {}", config.tts.speed);
    println!("tts.timeout_ms:                  {}", config.tts.timeout.as_millis());
    println!("daemon.poll_interval_ms:         {}", config.daemon.poll_interval.as_millis());
    println!("daemon.speak_responses:          {}", config.daemon.speak_responses);

    Ok(())
}
