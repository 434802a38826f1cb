//! Application and volume control agent

use std::process::{Command, Stdio};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use super::Agent;
use crate::intent::Intent;
use crate::{Error, Result};

/// Volume change requested by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeDirection {
    /// Louder
    Up,
    /// Quieter
    Down,
    /// Toggle mute
    Mute,
}

impl FromStr for VolumeDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "up" | "increase" | "louder" => Ok(Self::Up),
            "down" | "decrease" | "quieter" => Ok(Self::Down),
            "mute" | "unmute" => Ok(Self::Mute),
            other => Err(Error::Agent(format!("unknown volume direction: {other}"))),
        }
    }
}

/// Platform effects behind the system control agent
pub trait SystemBackend: Send + Sync {
    /// Start an application by name
    ///
    /// # Errors
    ///
    /// Returns error if the application cannot be found or started
    fn launch(&self, name: &str) -> Result<()>;

    /// Stop a running application by name
    ///
    /// # Errors
    ///
    /// Returns error if the application cannot be stopped
    fn close(&self, name: &str) -> Result<()>;

    /// Adjust the output volume
    ///
    /// # Errors
    ///
    /// Returns error if no volume control is available
    fn set_volume(&self, direction: VolumeDirection) -> Result<()>;
}

/// Executables tried, in order, for well-known application names
fn candidates(name: &str) -> Vec<String> {
    let known: &[&str] = match name {
        "chrome" => &["google-chrome", "google-chrome-stable", "chromium", "chromium-browser", "chrome"],
        "firefox" => &["firefox"],
        "notepad" => &["notepad", "gedit", "gnome-text-editor", "kate", "mousepad"],
        "terminal" => &["x-terminal-emulator", "gnome-terminal", "konsole", "xterm"],
        "calculator" => &["gnome-calculator", "kcalc", "calc"],
        "files" => &["nautilus", "dolphin", "thunar", "explorer"],
        _ => &[],
    };

    let mut names: Vec<String> = known.iter().map(|s| (*s).to_string()).collect();
    if !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
    names
}

fn validate_name(name: &str) -> Result<&str> {
    let name = name.trim();
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' '));

    if valid {
        Ok(name)
    } else {
        Err(Error::Agent(format!("invalid application name: {name}")))
    }
}

fn run(program: &str, args: &[&str]) -> Result<()> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| Error::Agent(format!("failed to run {program}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Agent(format!(
            "{program} {} failed: {stderr}",
            args.join(" ")
        )));
    }

    Ok(())
}

/// Controls the local machine with platform commands
#[derive(Debug, Default)]
pub struct HostBackend;

impl SystemBackend for HostBackend {
    fn launch(&self, name: &str) -> Result<()> {
        let name = validate_name(name)?;

        if cfg!(target_os = "macos") {
            return run("open", &["-a", name]);
        }

        let program = candidates(&name.to_lowercase())
            .into_iter()
            .find_map(|candidate| which::which(candidate).ok())
            .ok_or_else(|| Error::Agent(format!("no executable found for {name}")))?;

        Command::new(&program)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Agent(format!("failed to launch {}: {e}", program.display())))?;

        tracing::info!(program = %program.display(), "launched application");
        Ok(())
    }

    fn close(&self, name: &str) -> Result<()> {
        let name = validate_name(name)?;

        if cfg!(target_os = "windows") {
            let image = if name.ends_with(".exe") {
                name.to_string()
            } else {
                format!("{name}.exe")
            };
            return run("taskkill", &["/IM", &image, "/F"]);
        }

        let mut last_error = None;
        for candidate in candidates(&name.to_lowercase()) {
            match run("pkill", &["-f", &candidate]) {
                Ok(()) => {
                    tracing::info!(process = %candidate, "closed application");
                    return Ok(());
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Agent(format!("{name} is not running"))))
    }

    fn set_volume(&self, direction: VolumeDirection) -> Result<()> {
        if cfg!(target_os = "macos") {
            let script = match direction {
                VolumeDirection::Up => {
                    "set volume output volume ((output volume of (get volume settings)) + 10)"
                }
                VolumeDirection::Down => {
                    "set volume output volume ((output volume of (get volume settings)) - 10)"
                }
                VolumeDirection::Mute => {
                    "set volume output muted (not (output muted of (get volume settings)))"
                }
            };
            return run("osascript", &["-e", script]);
        }

        if which::which("pactl").is_ok() {
            let args: &[&str] = match direction {
                VolumeDirection::Up => &["set-sink-volume", "@DEFAULT_SINK@", "+10%"],
                VolumeDirection::Down => &["set-sink-volume", "@DEFAULT_SINK@", "-10%"],
                VolumeDirection::Mute => &["set-sink-mute", "@DEFAULT_SINK@", "toggle"],
            };
            return run("pactl", args);
        }

        if which::which("amixer").is_ok() {
            let args: &[&str] = match direction {
                VolumeDirection::Up => &["-q", "set", "Master", "10%+"],
                VolumeDirection::Down => &["-q", "set", "Master", "10%-"],
                VolumeDirection::Mute => &["-q", "set", "Master", "toggle"],
            };
            return run("amixer", args);
        }

        Err(Error::Agent("no volume control available".to_string()))
    }
}

/// Launches and closes applications and adjusts volume
pub struct SystemControlAgent {
    backend: Arc<dyn SystemBackend>,
}

impl SystemControlAgent {
    /// Create an agent over a backend
    #[must_use]
    pub fn new(backend: Arc<dyn SystemBackend>) -> Self {
        Self { backend }
    }

    /// Create an agent that controls this machine
    #[must_use]
    pub fn host() -> Self {
        Self::new(Arc::new(HostBackend))
    }

    async fn call<F>(&self, op: F) -> Result<()>
    where
        F: FnOnce(&dyn SystemBackend) -> Result<()> + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        tokio::task::spawn_blocking(move || op(backend.as_ref()))
            .await
            .map_err(|e| Error::Agent(format!("system task failed: {e}")))?
    }
}

#[async_trait]
impl Agent for SystemControlAgent {
    fn name(&self) -> &str {
        "system_control"
    }

    async fn execute(&self, intent: &Intent) -> String {
        match intent.action.as_str() {
            "launch_application" => {
                let Some(name) = intent.parameter_str("name").map(str::to_string) else {
                    return "I can launch an application, but you need to tell me which one."
                        .to_string();
                };

                tracing::info!(application = %name, "launching application");
                let target = name.clone();
                match self.call(move |backend| backend.launch(&target)).await {
                    Ok(()) => format!("Okay, launching {name}"),
                    Err(e) => {
                        tracing::warn!(application = %name, error = %e, "launch failed");
                        format!("I'm sorry, I couldn't find or launch the application named {name}")
                    }
                }
            }
            "close_application" => {
                let Some(name) = intent.parameter_str("name").map(str::to_string) else {
                    return "I can close an application, but you need to tell me which one."
                        .to_string();
                };

                tracing::info!(application = %name, "closing application");
                let target = name.clone();
                match self.call(move |backend| backend.close(&target)).await {
                    Ok(()) => format!("Okay, closing {name}"),
                    Err(e) => {
                        tracing::warn!(application = %name, error = %e, "close failed");
                        format!("I'm sorry, I couldn't close {name}")
                    }
                }
            }
            "set_volume" => {
                let Some(direction) = intent
                    .parameter_str("direction")
                    .and_then(|d| d.parse::<VolumeDirection>().ok())
                else {
                    return "Should I turn the volume up, down, or mute it?".to_string();
                };

                match self.call(move |backend| backend.set_volume(direction)).await {
                    Ok(()) => match direction {
                        VolumeDirection::Up => "Turning the volume up.".to_string(),
                        VolumeDirection::Down => "Turning the volume down.".to_string(),
                        VolumeDirection::Mute => "Toggling mute.".to_string(),
                    },
                    Err(e) => {
                        tracing::warn!(?direction, error = %e, "volume change failed");
                        "I'm sorry, I couldn't change the volume.".to_string()
                    }
                }
            }
            _ => "I don't know how to perform that system control action.".to_string(),
        }
    }
}
