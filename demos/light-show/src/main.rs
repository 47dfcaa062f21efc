//! # Light Show Demo
//!
//! Plays a short show against console lights: a colour sweep, a strobe that
//! runs in the background while a countdown plays, and a custom callback.
//! The strobe repeats forever, so the demo cancels it after a few seconds.
//!
//! Run with `RUST_LOG=specialeffects=debug,light_show=info` for more detail.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use specialeffects::{Easing, Hsv, Light, Repeat, SectionOptions, SpecialEffect};
use tracing::info;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Console light
// ============================================================================

struct ConsoleLight {
    name: &'static str,
}

#[async_trait]
impl Light for ConsoleLight {
    async fn turn_on(&self) -> Result<()> {
        info!(light = self.name, "on");
        Ok(())
    }

    async fn turn_off(&self) -> Result<()> {
        info!(light = self.name, "off");
        Ok(())
    }

    async fn set_color(&self, color: Hsv) -> Result<()> {
        info!(
            light = self.name,
            hue = color.hue,
            saturation = color.saturation,
            value = color.value,
            "color"
        );
        Ok(())
    }
}

// ============================================================================
// Show
// ============================================================================

fn build_show() -> specialeffects::Result<SpecialEffect> {
    let mut show = SpecialEffect::new();
    show.add_light("left", ConsoleLight { name: "left" })
        .add_light("right", ConsoleLight { name: "right" })
        .add_light_group("stage", ["left", "right"]);

    show.section(SectionOptions::named("sweep"), |fx| {
        fx.add_light_on("stage").add_light_color_transition(
            "stage",
            (300, 100, 100),
            (60, 100, 100),
            Duration::from_secs(1),
            "sine_in_out".parse::<Easing>()?,
        );
        Ok(())
    })?;

    show.section(SectionOptions::named("finale"), |fx| {
        fx.section(SectionOptions::named("strobe").forever(), |fx| {
            fx.add_light_on("left")
                .add_light_off("right")
                .add_delay(Duration::from_millis(150));
            fx.add_light_off("left")
                .add_light_on("right")
                .add_delay(Duration::from_millis(150));
            Ok(())
        })?;

        fx.section(SectionOptions::named("countdown").repeat(Repeat::times(3)?), |fx| {
            fx.add_custom(|| {
                info!("tick");
                Ok(())
            })
            .add_delay(Duration::from_millis(500));
            Ok(())
        })?;
        Ok(())
    })?;

    Ok(show)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let show = build_show()?;
    info!(outline = ?show.outline(), "show built");

    let tasks = show.background_tasks();
    let (played, ()) = tokio::join!(show.play_async(), async move {
        tokio::time::sleep(Duration::from_secs(4)).await;
        info!("stopping strobe");
        tasks.cancel_all();
    });
    played?;

    info!("show finished");
    Ok(())
}
