//! Test doubles for specialeffects shows.
//!
//! Every double writes into a shared [`EventLog`], so a test can assert on
//! the interleaving of lights, sounds, and marker effects across one run.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use specialeffects::{Hsv, Light, LightEffect, SoundPlayer};
use tokio::time::Instant;

/// One recorded call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub at: Instant,
    pub source: String,
    pub action: String,
}

impl Event {
    /// `"source:action"`, the form used by [`EventLog::entries`].
    pub fn entry(&self) -> String {
        format!("{}:{}", self.source, self.action)
    }
}

/// Shared, append-only record of calls.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, source: impl Into<String>, action: impl Into<String>) {
        self.lock().push(Event {
            at: Instant::now(),
            source: source.into(),
            action: action.into(),
        });
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().clone()
    }

    /// All events as `"source:action"` strings, in recording order.
    pub fn entries(&self) -> Vec<String> {
        self.lock().iter().map(Event::entry).collect()
    }

    /// Actions recorded by one source, in order.
    pub fn actions_of(&self, source: &str) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|event| event.source == source)
            .map(|event| event.action.clone())
            .collect()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.lock().iter().filter(|event| event.entry() == entry).count()
    }

    /// Position of the first event matching `entry`.
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.lock().iter().position(|event| event.entry() == entry)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Event>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Light that records every call as `name:on`, `name:off`, or
/// `name:color h/s/v`.
#[derive(Clone)]
pub struct RecordingLight {
    name: String,
    log: EventLog,
    latency: Duration,
    failure: Option<String>,
}

impl RecordingLight {
    pub fn new(name: impl Into<String>, log: &EventLog) -> Self {
        Self {
            name: name.into(),
            log: log.clone(),
            latency: Duration::ZERO,
            failure: None,
        }
    }

    /// Delay applied before every call completes.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make every call fail with `message` after it has been recorded.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    async fn call(&self, action: String) -> Result<()> {
        self.log.record(&self.name, action);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if let Some(message) = &self.failure {
            bail!("{message}");
        }
        Ok(())
    }
}

#[async_trait]
impl Light for RecordingLight {
    async fn turn_on(&self) -> Result<()> {
        self.call("on".into()).await
    }

    async fn turn_off(&self) -> Result<()> {
        self.call("off".into()).await
    }

    async fn set_color(&self, color: Hsv) -> Result<()> {
        self.call(format!(
            "color {}/{}/{}",
            color.hue, color.saturation, color.value
        ))
        .await
    }
}

/// Sound player recording `player:start <file>` and `player:end <file>`.
#[derive(Clone)]
pub struct RecordingPlayer {
    log: EventLog,
    length: Duration,
}

impl RecordingPlayer {
    pub fn new(log: &EventLog) -> Self {
        Self {
            log: log.clone(),
            length: Duration::ZERO,
        }
    }

    /// How long every sound takes to play.
    pub fn with_length(mut self, length: Duration) -> Self {
        self.length = length;
        self
    }
}

#[async_trait]
impl SoundPlayer for RecordingPlayer {
    async fn play_sound(&self, file: &Path) -> Result<()> {
        self.log.record("player", format!("start {}", file.display()));
        if !self.length.is_zero() {
            tokio::time::sleep(self.length).await;
        }
        self.log.record("player", format!("end {}", file.display()));
        Ok(())
    }
}

/// Marker effect recording `label:start`, waiting `duration`, then
/// recording `label:end`.
pub fn step(log: &EventLog, label: impl Into<String>, duration: Duration) -> LightEffect {
    let log = log.clone();
    let label = label.into();
    LightEffect::new(move || {
        let log = log.clone();
        let label = label.clone();
        async move {
            log.record(label.as_str(), "start");
            tokio::time::sleep(duration).await;
            log.record(label.as_str(), "end");
            Ok(())
        }
    })
}
