//! The effect abstraction and its leaf variants.

use std::fmt;
use std::future::Future;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;

use crate::device::SoundPlayer;
use crate::error::{Error, Result};
use crate::tasks::{panicked, PlayContext};

/// How many times an effect performs its action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Repeat {
    Times(NonZeroU32),
    /// Repeat until cancelled.
    Forever,
}

impl Repeat {
    pub const ONCE: Repeat = Repeat::Times(NonZeroU32::MIN);

    /// A finite repeat count. Zero is rejected.
    pub fn times(count: u32) -> Result<Self> {
        NonZeroU32::new(count)
            .map(Self::Times)
            .ok_or_else(|| Error::config("repeat count must be at least 1"))
    }

    pub fn is_forever(self) -> bool {
        matches!(self, Self::Forever)
    }

    /// The finite count, or `None` when unbounded.
    pub fn count(self) -> Option<u32> {
        match self {
            Self::Times(n) => Some(n.get()),
            Self::Forever => None,
        }
    }
}

impl Default for Repeat {
    fn default() -> Self {
        Self::ONCE
    }
}

impl From<NonZeroU32> for Repeat {
    fn from(count: NonZeroU32) -> Self {
        Self::Times(count)
    }
}

/// `None` means unbounded.
impl From<Option<NonZeroU32>> for Repeat {
    fn from(count: Option<NonZeroU32>) -> Self {
        count.map_or(Self::Forever, Self::Times)
    }
}

impl TryFrom<u32> for Repeat {
    type Error = Error;

    fn try_from(count: u32) -> Result<Self> {
        Self::times(count)
    }
}

impl fmt::Display for Repeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Times(n) => write!(f, "{n}x"),
            Self::Forever => f.write_str("forever"),
        }
    }
}

/// A schedulable unit of work with a repeat policy.
///
/// Implementors provide a single pass in [`Effect::run_once`]; [`Effect::run`]
/// repeats it sequentially according to [`Effect::repeat`], awaiting each pass
/// before starting the next. An unbounded effect only stops when cancelled or
/// when a pass fails.
#[async_trait]
pub trait Effect: Send + Sync {
    /// Label used in logs and for background task tracking.
    fn name(&self) -> Option<&str> {
        None
    }

    fn repeat(&self) -> Repeat {
        Repeat::ONCE
    }

    async fn run_once(&self, ctx: &PlayContext) -> Result<()>;

    /// Whether a parent section hands this effect to the background instead
    /// of awaiting it.
    fn runs_in_background(&self) -> bool {
        false
    }

    async fn run(&self, ctx: &PlayContext) -> Result<()> {
        match self.repeat() {
            Repeat::Times(count) => {
                for _ in 0..count.get() {
                    self.run_once(ctx).await?;
                }
            }
            Repeat::Forever => loop {
                self.run_once(ctx).await?;
                tokio::task::yield_now().await;
            },
        }
        Ok(())
    }
}

type Action = Box<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Wraps a no-argument asynchronous action, typically light commands or a
/// pause.
pub struct LightEffect {
    action: Action,
    repeat: Repeat,
}

impl LightEffect {
    pub fn new<F, Fut>(action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            action: Box::new(move || action().boxed()),
            repeat: Repeat::ONCE,
        }
    }

    /// An effect that only waits.
    pub fn delay(duration: Duration) -> Self {
        Self::new(move || async move {
            tokio::time::sleep(duration).await;
            Ok(())
        })
    }

    pub fn with_repeat(mut self, repeat: Repeat) -> Self {
        self.repeat = repeat;
        self
    }
}

impl fmt::Debug for LightEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LightEffect")
            .field("repeat", &self.repeat)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Effect for LightEffect {
    fn repeat(&self) -> Repeat {
        self.repeat
    }

    async fn run_once(&self, _ctx: &PlayContext) -> Result<()> {
        (self.action)().await
    }
}

/// Plays a sound file through a shared player.
pub struct SoundEffect {
    file: PathBuf,
    player: Arc<dyn SoundPlayer>,
    repeat: Repeat,
}

impl SoundEffect {
    pub fn new(file: impl Into<PathBuf>, player: Arc<dyn SoundPlayer>) -> Self {
        Self {
            file: file.into(),
            player,
            repeat: Repeat::ONCE,
        }
    }

    pub fn with_repeat(mut self, repeat: Repeat) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn file(&self) -> &Path {
        &self.file
    }
}

impl fmt::Debug for SoundEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoundEffect")
            .field("file", &self.file)
            .field("repeat", &self.repeat)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Effect for SoundEffect {
    fn repeat(&self) -> Repeat {
        self.repeat
    }

    async fn run_once(&self, _ctx: &PlayContext) -> Result<()> {
        tracing::debug!(file = %self.file.display(), "playing sound");
        self.player
            .play_sound(&self.file)
            .await
            .map_err(|source| Error::Sound {
                file: self.file.clone(),
                source,
            })
    }
}

type Callable = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Runs a synchronous callable on the blocking worker pool so long calls do
/// not stall the scheduler.
///
/// Arguments are captured by the closure. Repeats like every other effect.
pub struct CustomEffect {
    func: Callable,
    repeat: Repeat,
}

impl CustomEffect {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
            repeat: Repeat::ONCE,
        }
    }

    pub fn with_repeat(mut self, repeat: Repeat) -> Self {
        self.repeat = repeat;
        self
    }
}

impl fmt::Debug for CustomEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomEffect")
            .field("repeat", &self.repeat)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Effect for CustomEffect {
    fn repeat(&self) -> Repeat {
        self.repeat
    }

    async fn run_once(&self, _ctx: &PlayContext) -> Result<()> {
        let func = Arc::clone(&self.func);
        match tokio::task::spawn_blocking(move || func()).await {
            Ok(result) => result.map_err(Error::Custom),
            Err(err) => Err(panicked(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn counting(counter: &Arc<AtomicUsize>) -> LightEffect {
        let counter = Arc::clone(counter);
        LightEffect::new(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    #[test]
    fn zero_repeat_is_rejected() {
        assert!(matches!(Repeat::times(0), Err(Error::Config(_))));
        assert!(Repeat::try_from(0u32).is_err());
        assert_eq!(Repeat::times(3).unwrap().count(), Some(3));
        assert_eq!(Repeat::from(None), Repeat::Forever);
        assert_eq!(Repeat::default(), Repeat::ONCE);
    }

    #[tokio::test]
    async fn finite_repeat_runs_exactly_n_times() {
        let counter = Arc::new(AtomicUsize::new(0));
        let effect = counting(&counter).with_repeat(Repeat::times(4).unwrap());

        effect.run(&PlayContext::default()).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_repeat_runs_until_cancelled() {
        let counter = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&counter);
        let effect = LightEffect::new(move || {
            let counter = Arc::clone(&inner);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(())
            }
        })
        .with_repeat(Repeat::Forever);

        let ctx = PlayContext::default();
        let outcome = tokio::time::timeout(Duration::from_secs(1), effect.run(&ctx)).await;
        assert!(outcome.is_err(), "unbounded effect finished on its own");
        assert!(counter.load(Ordering::SeqCst) >= 9);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_waits_for_its_duration() {
        let begin = tokio::time::Instant::now();
        LightEffect::delay(Duration::from_secs(2))
            .run(&PlayContext::default())
            .await
            .unwrap();
        assert!(begin.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn failing_pass_stops_the_repeat() {
        let counter = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&counter);
        let effect = LightEffect::new(move || {
            let n = inner.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 1 {
                    return Err(Error::TargetNotFound("attic".into()));
                }
                Ok(())
            }
        })
        .with_repeat(Repeat::times(5).unwrap());

        let err = effect.run(&PlayContext::default()).await.unwrap_err();
        assert!(matches!(err, Error::TargetNotFound(_)));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn custom_effect_runs_off_the_scheduler_thread() {
        let scheduler = std::thread::current().id();
        let worker = Arc::new(Mutex::new(None));
        let seen = Arc::clone(&worker);
        let effect = CustomEffect::new(move || {
            *seen.lock().unwrap() = Some(std::thread::current().id());
            Ok(())
        });

        effect.run(&PlayContext::default()).await.unwrap();
        let worker = worker.lock().unwrap().expect("callable did not run");
        assert_ne!(worker, scheduler);
    }

    #[tokio::test]
    async fn custom_effect_honours_repeat() {
        let counter = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&counter);
        let effect = CustomEffect::new(move || {
            inner.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .with_repeat(Repeat::times(3).unwrap());

        effect.run(&PlayContext::default()).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn custom_failures_and_panics_propagate() {
        let failing = CustomEffect::new(|| anyhow::bail!("fog machine empty"));
        let err = failing.run(&PlayContext::default()).await.unwrap_err();
        assert!(matches!(err, Error::Custom(ref e) if e.to_string() == "fog machine empty"));

        let panicking = CustomEffect::new(|| panic!("fuse blown"));
        let err = panicking.run(&PlayContext::default()).await.unwrap_err();
        assert!(matches!(err, Error::TaskPanicked(ref msg) if msg.contains("fuse blown")));
    }
}
