//! Capabilities consumed by the engine: lights and a sound player.
//!
//! Drivers live outside this crate. Anything that can switch on, switch off
//! and take an HSV colour can be registered as a light; anything that can play
//! a file to completion can back sound effects.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

use crate::color::Hsv;

/// Environment variable naming the program used by [`SystemPlayer`].
pub const PLAYER_ENV: &str = "SPECIALEFFECTS_PLAYER";

/// A network- or bus-controlled light.
#[async_trait]
pub trait Light: Send + Sync {
    async fn turn_on(&self) -> Result<()>;

    async fn turn_off(&self) -> Result<()>;

    async fn set_color(&self, color: Hsv) -> Result<()>;
}

/// Audio backend able to play a file to completion.
#[async_trait]
pub trait SoundPlayer: Send + Sync {
    async fn play_sound(&self, file: &Path) -> Result<()>;
}

/// Shared handle to a registered light.
pub type SharedLight = Arc<dyn Light>;

/// A single instruction for a light.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightAction {
    TurnOn,
    TurnOff,
    SetColor(Hsv),
}

impl LightAction {
    pub async fn apply(self, light: &dyn Light) -> Result<()> {
        match self {
            Self::TurnOn => light.turn_on().await,
            Self::TurnOff => light.turn_off().await,
            Self::SetColor(color) => light.set_color(color).await,
        }
    }
}

/// Default sound backend: hands the file to an external player program.
#[derive(Clone, Debug)]
pub struct SystemPlayer {
    program: String,
    args: Vec<String>,
}

impl SystemPlayer {
    /// Player running `program` with the sound file as its only argument.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Extra arguments placed before the file path.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Program from [`PLAYER_ENV`], falling back to the platform player.
    pub fn from_env() -> Self {
        match std::env::var(PLAYER_ENV) {
            Ok(program) if !program.trim().is_empty() => Self::new(program.trim()),
            _ => Self::platform_default(),
        }
    }

    fn platform_default() -> Self {
        if cfg!(target_os = "macos") {
            Self::new("afplay")
        } else {
            Self::new("aplay").with_args(["-q"])
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for SystemPlayer {
    fn default() -> Self {
        Self::from_env()
    }
}

#[async_trait]
impl SoundPlayer for SystemPlayer {
    async fn play_sound(&self, file: &Path) -> Result<()> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(file)
            .kill_on_drop(true)
            .status()
            .await
            .with_context(|| format!("failed to launch '{}'", self.program))?;

        if !status.success() {
            bail!("'{}' exited with {status}", self.program);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Probe {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Light for Probe {
        async fn turn_on(&self) -> Result<()> {
            self.calls.lock().unwrap().push("on".into());
            Ok(())
        }

        async fn turn_off(&self) -> Result<()> {
            self.calls.lock().unwrap().push("off".into());
            Ok(())
        }

        async fn set_color(&self, color: Hsv) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("color {} {} {}", color.hue, color.saturation, color.value));
            Ok(())
        }
    }

    #[tokio::test]
    async fn actions_dispatch_to_matching_capability() {
        let probe = Probe::default();
        LightAction::TurnOn.apply(&probe).await.unwrap();
        LightAction::SetColor(Hsv::new(240, 100, 50)).apply(&probe).await.unwrap();
        LightAction::TurnOff.apply(&probe).await.unwrap();

        assert_eq!(
            *probe.calls.lock().unwrap(),
            vec!["on", "color 240 100 50", "off"]
        );
    }

    #[test]
    fn explicit_player_keeps_program_and_args() {
        let player = SystemPlayer::new("paplay").with_args(["--volume", "32768"]);
        assert_eq!(player.program(), "paplay");
        assert_eq!(player.args, vec!["--volume", "32768"]);
    }

    #[tokio::test]
    async fn missing_program_is_reported() {
        let player = SystemPlayer::new("specialeffects-no-such-player");
        let err = player.play_sound(Path::new("boom.wav")).await.unwrap_err();
        assert!(err.to_string().contains("specialeffects-no-such-player"));
    }
}
