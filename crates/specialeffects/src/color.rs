//! HSV colours and time-driven transitions between them.

use std::time::Duration;

use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};

use crate::easing::Easing;
use crate::error::{Error, Result};

/// Time between two samples of a colour transition.
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// A colour as understood by the light capability.
///
/// `hue` is in degrees `[0, 360)`; `saturation` and `value` are percentages.
/// [`Hsv::new`] and the tuple conversion do not check the hue; shows reject
/// out-of-range colours when they start playing, and deserialization rejects
/// them outright.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawHsv")]
pub struct Hsv {
    pub hue: u16,
    pub saturation: u8,
    pub value: u8,
}

impl Hsv {
    pub const fn new(hue: u16, saturation: u8, value: u8) -> Self {
        Self {
            hue,
            saturation,
            value,
        }
    }

    /// Checked constructor: fails with [`Error::Config`] for a hue of 360 or more.
    pub fn try_new(hue: u16, saturation: u8, value: u8) -> Result<Self> {
        Self::new(hue, saturation, value).validated()
    }

    pub(crate) fn validated(self) -> Result<Self> {
        if self.hue >= 360 {
            return Err(Error::config(format!(
                "hue {} is outside [0, 360)",
                self.hue
            )));
        }
        Ok(self)
    }
}

impl From<(u16, u8, u8)> for Hsv {
    fn from((hue, saturation, value): (u16, u8, u8)) -> Self {
        Self::new(hue, saturation, value)
    }
}

#[derive(Deserialize)]
struct RawHsv {
    hue: u16,
    saturation: u8,
    value: u8,
}

impl TryFrom<RawHsv> for Hsv {
    type Error = Error;

    fn try_from(raw: RawHsv) -> Result<Self> {
        Self::try_new(raw.hue, raw.saturation, raw.value)
    }
}

/// Blend two colours at `progress`.
///
/// Hue always travels forward around the wheel: when `end` is below `start`
/// it is lifted by a full turn before blending. Components are truncated.
/// Both hues must be below 360.
pub fn interpolate(start: Hsv, end: Hsv, progress: f64) -> Hsv {
    let start_hue = f64::from(start.hue);
    let mut end_hue = f64::from(end.hue);
    if end_hue < start_hue {
        end_hue += 360.0;
    }
    let hue = (start_hue + (end_hue - start_hue) * progress).rem_euclid(360.0);

    Hsv {
        hue: (hue as u16) % 360,
        saturation: lerp(start.saturation, end.saturation, progress) as u8,
        value: lerp(start.value, end.value, progress) as u8,
    }
}

fn lerp(start: u8, end: u8, progress: f64) -> f64 {
    let start = f64::from(start);
    start + (f64::from(end) - start) * progress
}

/// Stream of colours sampled every [`SAMPLE_INTERVAL`] until `duration` has
/// elapsed since the first sample was requested.
///
/// The stream ends once raw progress reaches 1 and is not restartable; call
/// again to replay. A zero `duration` yields nothing.
pub fn interpolate_over_time(
    start: Hsv,
    end: Hsv,
    duration: Duration,
    easing: Easing,
) -> impl Stream<Item = Hsv> + Send + 'static {
    stream::unfold(None::<Instant>, move |origin| async move {
        let origin = match origin {
            Some(origin) => {
                sleep(SAMPLE_INTERVAL).await;
                origin
            }
            None => Instant::now(),
        };

        let progress = raw_progress(origin.elapsed(), duration);
        if progress >= 1.0 {
            return None;
        }

        let color = interpolate(start, end, easing.apply(progress));
        tracing::trace!(?color, progress, "colour sample");
        Some((color, Some(origin)))
    })
}

/// Like [`interpolate_over_time`], with the easing curve selected by name.
///
/// Unknown names fail here, before anything is scheduled.
pub fn interpolate_over_time_named(
    start: Hsv,
    end: Hsv,
    duration: Duration,
    easing: &str,
) -> Result<impl Stream<Item = Hsv> + Send + 'static> {
    let easing = easing.parse::<Easing>()?;
    Ok(interpolate_over_time(start, end, duration, easing))
}

fn raw_progress(elapsed: Duration, duration: Duration) -> f64 {
    if duration.is_zero() {
        return 1.0;
    }
    elapsed.as_secs_f64() / duration.as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn endpoints_return_the_inputs() {
        let start = Hsv::new(120, 40, 90);
        let end = Hsv::new(30, 100, 10);
        assert_eq!(interpolate(start, end, 0.0), start);
        assert_eq!(interpolate(start, end, 1.0), end);
    }

    #[test]
    fn hue_wraps_forward_through_zero() {
        let color = interpolate(Hsv::new(350, 0, 0), Hsv::new(10, 0, 0), 0.5);
        assert_eq!(color.hue, 0);
    }

    #[test]
    fn hue_moves_forward_without_wrap() {
        let color = interpolate(Hsv::new(10, 0, 0), Hsv::new(110, 0, 0), 0.25);
        assert_eq!(color.hue, 35);
    }

    #[test]
    fn components_are_truncated() {
        let color = interpolate(Hsv::new(0, 0, 0), Hsv::new(3, 3, 3), 0.5);
        assert_eq!(color, Hsv::new(1, 1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn transition_samples_every_interval_until_done() {
        let samples: Vec<Hsv> = interpolate_over_time(
            Hsv::new(0, 0, 0),
            Hsv::new(100, 100, 100),
            Duration::from_secs(1),
            Easing::Linear,
        )
        .collect()
        .await;

        assert!((10..=11).contains(&samples.len()), "{} samples", samples.len());
        assert_eq!(samples[0], Hsv::new(0, 0, 0));
        assert!(samples.windows(2).all(|pair| pair[0].hue <= pair[1].hue));
        assert!(samples.iter().all(|c| c.value < 100));
    }

    #[tokio::test(start_paused = true)]
    async fn transition_takes_roughly_its_duration() {
        let begin = Instant::now();
        let count = interpolate_over_time(
            Hsv::default(),
            Hsv::new(200, 50, 50),
            Duration::from_millis(450),
            Easing::SineInOut,
        )
        .count()
        .await;

        assert_eq!(count, 5);
        assert!(begin.elapsed() >= Duration::from_millis(450));
    }

    #[tokio::test]
    async fn zero_duration_yields_nothing() {
        let count = interpolate_over_time(Hsv::default(), Hsv::default(), Duration::ZERO, Easing::Linear)
            .count()
            .await;
        assert_eq!(count, 0);
    }

    #[test]
    fn named_transition_rejects_unknown_easing() {
        let result = interpolate_over_time_named(
            Hsv::default(),
            Hsv::default(),
            Duration::from_secs(1),
            "elastic",
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn hues_outside_the_wheel_are_rejected() {
        assert_eq!(Hsv::try_new(359, 100, 100).unwrap(), Hsv::new(359, 100, 100));
        assert!(matches!(Hsv::try_new(360, 0, 0), Err(Error::Config(_))));
        assert!(matches!(Hsv::try_new(400, 0, 0), Err(Error::Config(_))));
    }

    #[test]
    fn deserialization_checks_the_hue() {
        let color: Hsv = serde_json::from_str(r#"{"hue":240,"saturation":100,"value":50}"#).unwrap();
        assert_eq!(color, Hsv::new(240, 100, 50));

        let err = serde_json::from_str::<Hsv>(r#"{"hue":400,"saturation":0,"value":0}"#).unwrap_err();
        assert!(err.to_string().contains("hue 400"));
    }
}
