//! Composite effect running its children sequentially or in parallel.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::debug;

use crate::effect::{Effect, Repeat};
use crate::error::{Error, Result};
use crate::tasks::PlayContext;

/// An ordered group of effects.
///
/// Each pass runs the children in list order, one after another, or starts
/// them all together and waits for every one of them when `parallel` is set.
/// A child section that repeats forever is handed to the run's background
/// tasks instead of being awaited.
pub struct Section {
    name: Option<String>,
    parallel: bool,
    repeat: Repeat,
    effects: Vec<Arc<dyn Effect>>,
}

impl Section {
    /// A sequential section running once.
    pub fn new(effects: Vec<Arc<dyn Effect>>) -> Self {
        Self {
            name: None,
            parallel: false,
            repeat: Repeat::ONCE,
            effects,
        }
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_repeat(mut self, repeat: Repeat) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    pub fn effects(&self) -> &[Arc<dyn Effect>] {
        &self.effects
    }
}

impl fmt::Debug for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Section")
            .field("name", &self.name)
            .field("parallel", &self.parallel)
            .field("repeat", &self.repeat)
            .field("effects", &self.effects.len())
            .finish()
    }
}

#[async_trait]
impl Effect for Section {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn repeat(&self) -> Repeat {
        self.repeat
    }

    fn runs_in_background(&self) -> bool {
        self.repeat.is_forever()
    }

    async fn run_once(&self, ctx: &PlayContext) -> Result<()> {
        debug!(
            section = self.name.as_deref(),
            parallel = self.parallel,
            children = self.effects.len(),
            "section pass"
        );

        if self.parallel {
            let results = join_all(self.effects.iter().map(|effect| run_child(effect, ctx))).await;
            return Error::collect(results);
        }

        for effect in &self.effects {
            run_child(effect, ctx).await?;
        }
        Ok(())
    }
}

async fn run_child(effect: &Arc<dyn Effect>, ctx: &PlayContext) -> Result<()> {
    if !effect.runs_in_background() {
        return effect.run(ctx).await;
    }

    let child = Arc::clone(effect);
    let task_ctx = ctx.clone();
    ctx.tasks().spawn(effect.name().map(str::to_owned), async move {
        child.run(&task_ctx).await
    });
    // Let the background section start before the parent moves on.
    tokio::task::yield_now().await;
    Ok(())
}
