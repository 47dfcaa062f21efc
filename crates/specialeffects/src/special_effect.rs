//! Show builder and run-to-completion driver.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::color::{interpolate_over_time, Hsv};
use crate::device::{Light, LightAction, SharedLight, SoundPlayer, SystemPlayer};
use crate::easing::Easing;
use crate::effect::{CustomEffect, Effect, LightEffect, Repeat, SoundEffect};
use crate::error::{Error, Result};
use crate::fixtures::Fixtures;
use crate::section::Section;
use crate::tasks::{BackgroundTasks, PlayContext};

/// Options for [`SpecialEffect::section`].
///
/// Fields left unset keep the current values of a re-opened named section.
/// A new section defaults to sequential, running once.
#[derive(Clone, Debug, Default)]
pub struct SectionOptions {
    name: Option<String>,
    parallel: Option<bool>,
    repeat: Option<Repeat>,
}

impl SectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::new().name(name)
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn parallel(mut self) -> Self {
        self.parallel = Some(true);
        self
    }

    pub fn sequential(mut self) -> Self {
        self.parallel = Some(false);
        self
    }

    pub fn repeat(mut self, repeat: Repeat) -> Self {
        self.repeat = Some(repeat);
        self
    }

    pub fn forever(self) -> Self {
        self.repeat(Repeat::Forever)
    }
}

/// Read-only view of a show definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outline {
    Effect(String),
    Section {
        name: Option<String>,
        parallel: bool,
        repeat: Repeat,
        children: Vec<Outline>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct SectionId(usize);

struct SectionDraft {
    name: Option<String>,
    parallel: bool,
    repeat: Repeat,
    entries: Vec<Entry>,
    linked: bool,
}

impl SectionDraft {
    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }
}

enum Entry {
    Cue(Cue),
    Section(SectionId),
}

/// A leaf recorded by the builder. Light cues resolve their target when the
/// effect runs, against the fixtures captured when playback starts.
enum Cue {
    Light {
        target: String,
        action: LightAction,
    },
    Transition {
        target: String,
        start: Hsv,
        end: Hsv,
        duration: Duration,
        easing: Easing,
    },
    Effect {
        label: String,
        effect: Arc<dyn Effect>,
    },
}

impl Cue {
    fn label(&self) -> String {
        match self {
            Self::Light { target, action } => match action {
                LightAction::TurnOn => format!("turn_on {target}"),
                LightAction::TurnOff => format!("turn_off {target}"),
                LightAction::SetColor(c) => {
                    format!("set_color {target} {}/{}/{}", c.hue, c.saturation, c.value)
                }
            },
            Self::Transition {
                target,
                duration,
                easing,
                ..
            } => format!("transition {target} {duration:?} {easing}"),
            Self::Effect { label, .. } => label.clone(),
        }
    }

    fn compile(&self, fixtures: &Arc<Fixtures>) -> Result<Arc<dyn Effect>> {
        let effect: Arc<dyn Effect> = match self {
            Self::Light { target, action } => {
                if let LightAction::SetColor(color) = action {
                    color.validated()?;
                }
                Arc::new(light_effect(Arc::clone(fixtures), target.clone(), *action))
            }
            Self::Transition {
                target,
                start,
                end,
                duration,
                easing,
            } => Arc::new(transition_effect(
                Arc::clone(fixtures),
                target.clone(),
                start.validated()?,
                end.validated()?,
                *duration,
                *easing,
            )),
            Self::Effect { effect, .. } => Arc::clone(effect),
        };
        Ok(effect)
    }
}

fn light_effect(fixtures: Arc<Fixtures>, target: String, action: LightAction) -> LightEffect {
    LightEffect::new(move || {
        let fixtures = Arc::clone(&fixtures);
        let target = target.clone();
        async move {
            for fixture in fixtures.resolve(&target)? {
                fixture.apply(action).await?;
            }
            Ok(())
        }
    })
}

fn transition_effect(
    fixtures: Arc<Fixtures>,
    target: String,
    start: Hsv,
    end: Hsv,
    duration: Duration,
    easing: Easing,
) -> LightEffect {
    LightEffect::new(move || {
        let fixtures = Arc::clone(&fixtures);
        let target = target.clone();
        async move {
            let lights = fixtures.resolve(&target)?;
            let mut samples = pin!(interpolate_over_time(start, end, duration, easing));
            while let Some(color) = samples.next().await {
                let action = LightAction::SetColor(color);
                let results = join_all(lights.iter().map(|fixture| fixture.apply(action))).await;
                Error::collect(results)?;
            }
            Ok(())
        }
    })
}

/// Registry of lights and sections plus the show they make up.
///
/// Build the show with the `add_*` methods and [`section`](Self::section),
/// then drive it with [`play`](Self::play). Registries must not change while
/// a run is in progress; each run captures the lights registered at its
/// start.
///
/// ```ignore
/// let mut show = SpecialEffect::new();
/// show.add_light("left", left).add_light("right", right);
/// show.add_light_group("stage", ["left", "right"]);
/// show.section(SectionOptions::named("strobe").forever(), |fx| {
///     fx.add_light_on("stage").add_delay(Duration::from_millis(50));
///     fx.add_light_off("stage").add_delay(Duration::from_millis(50));
///     Ok(())
/// })?;
/// show.play()?;
/// ```
pub struct SpecialEffect {
    fixtures: Fixtures,
    sections: Vec<SectionDraft>,
    named: HashMap<String, SectionId>,
    top: Vec<Entry>,
    open: Vec<SectionId>,
    default_player: Option<Arc<dyn SoundPlayer>>,
    tasks: BackgroundTasks,
}

impl Default for SpecialEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SpecialEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpecialEffect")
            .field("sections", &self.sections.len())
            .field("top", &self.top.len())
            .field("open", &self.open.len())
            .finish_non_exhaustive()
    }
}

impl SpecialEffect {
    pub fn new() -> Self {
        Self {
            fixtures: Fixtures::default(),
            sections: Vec::new(),
            named: HashMap::new(),
            top: Vec::new(),
            open: Vec::new(),
            default_player: None,
            tasks: BackgroundTasks::new(),
        }
    }

    /// Player used by [`add_sound`](Self::add_sound). Defaults to
    /// [`SystemPlayer::from_env`].
    pub fn with_default_player(mut self, player: Arc<dyn SoundPlayer>) -> Self {
        self.default_player = Some(player);
        self
    }

    /// Handle to the background sections of the current run, for cancelling.
    pub fn background_tasks(&self) -> BackgroundTasks {
        self.tasks.clone()
    }

    pub fn add_light(&mut self, name: impl Into<String>, light: impl Light + 'static) -> &mut Self {
        self.add_shared_light(name, Arc::new(light))
    }

    pub fn add_shared_light(&mut self, name: impl Into<String>, light: SharedLight) -> &mut Self {
        self.fixtures.insert_light(name, light);
        self
    }

    /// Group already registered lights under `name`. Unknown members are
    /// skipped.
    pub fn add_light_group<I, S>(&mut self, name: impl Into<String>, members: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.fixtures.insert_group(name, members);
        self
    }

    pub fn add_light_on(&mut self, target: impl Into<String>) -> &mut Self {
        self.add_light_action(target, LightAction::TurnOn)
    }

    pub fn add_light_off(&mut self, target: impl Into<String>) -> &mut Self {
        self.add_light_action(target, LightAction::TurnOff)
    }

    pub fn add_light_color(&mut self, target: impl Into<String>, color: impl Into<Hsv>) -> &mut Self {
        self.add_light_action(target, LightAction::SetColor(color.into()))
    }

    /// Fade every target from `start` to `end` over `duration`, updating all
    /// of them together at each sample.
    pub fn add_light_color_transition(
        &mut self,
        target: impl Into<String>,
        start: impl Into<Hsv>,
        end: impl Into<Hsv>,
        duration: Duration,
        easing: Easing,
    ) -> &mut Self {
        self.push(Entry::Cue(Cue::Transition {
            target: target.into(),
            start: start.into(),
            end: end.into(),
            duration,
            easing,
        }))
    }

    pub fn add_sound(&mut self, file: impl Into<PathBuf>) -> &mut Self {
        let player = Arc::clone(
            self.default_player
                .get_or_insert_with(|| Arc::new(SystemPlayer::from_env()) as Arc<dyn SoundPlayer>),
        );
        self.add_sound_with(file, player)
    }

    pub fn add_sound_with(&mut self, file: impl Into<PathBuf>, player: Arc<dyn SoundPlayer>) -> &mut Self {
        let effect = SoundEffect::new(file, player);
        let label = format!("sound {}", effect.file().display());
        self.add_labelled(label, Arc::new(effect))
    }

    pub fn add_delay(&mut self, duration: Duration) -> &mut Self {
        self.add_labelled(format!("delay {duration:?}"), Arc::new(LightEffect::delay(duration)))
    }

    /// Run `func` on the blocking pool. Arguments are whatever it captures.
    pub fn add_custom<F>(&mut self, func: F) -> &mut Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add_labelled("custom".to_string(), Arc::new(CustomEffect::new(func)))
    }

    /// Append any effect, e.g. a leaf built with its own repeat count.
    pub fn add_effect(&mut self, effect: impl Effect + 'static) -> &mut Self {
        let label = effect.name().unwrap_or("effect").to_string();
        self.add_labelled(label, Arc::new(effect))
    }

    /// Open a section, run `build` with it as the insertion target, then link
    /// it into the enclosing section (or the top level) unless it is already
    /// linked somewhere.
    ///
    /// Re-opening a named section extends the same section wherever it is
    /// referenced. A section cannot be opened inside itself. When `build`
    /// fails the section is left unlinked and the error is returned.
    pub fn section<F>(&mut self, options: SectionOptions, build: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let id = self.open_section(options)?;
        self.open.push(id);
        let built = build(self);
        self.open.pop();
        built?;

        self.link(id);
        Ok(self)
    }

    /// Current shape of the show.
    pub fn outline(&self) -> Vec<Outline> {
        self.top.iter().map(|entry| self.outline_entry(entry)).collect()
    }

    /// Run the show to completion on a single-threaded scheduler.
    ///
    /// Blocks until every top-level effect and every background section has
    /// finished; background sections that repeat forever must be cancelled
    /// through [`background_tasks`](Self::background_tasks). The first
    /// failure, whether top-level or in a background section, stops the
    /// top-level run, cancels every background section and is returned.
    pub fn play(&self) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.play_async())
    }

    /// [`play`](Self::play) for callers already inside a tokio runtime.
    pub async fn play_async(&self) -> Result<()> {
        let effects = self.compile()?;
        self.tasks.reset();
        let ctx = PlayContext::new(self.tasks.clone());

        info!(effects = effects.len(), "show started");
        let top_level = async {
            for effect in &effects {
                effect.run(&ctx).await?;
            }
            Ok::<(), Error>(())
        };
        let outcome: Result<()> = tokio::select! {
            result = top_level => result,
            failure = self.tasks.first_failure() => Err(failure),
        };
        if let Err(err) = outcome {
            warn!(error = %err, "show aborted");
            self.tasks.shutdown().await;
            return Err(err);
        }

        if !self.tasks.is_empty() {
            debug!(count = self.tasks.len(), "waiting for background sections");
        }
        self.tasks.join_all().await?;
        info!("show finished");
        Ok(())
    }

    fn add_light_action(&mut self, target: impl Into<String>, action: LightAction) -> &mut Self {
        self.push(Entry::Cue(Cue::Light {
            target: target.into(),
            action,
        }))
    }

    fn add_labelled(&mut self, label: String, effect: Arc<dyn Effect>) -> &mut Self {
        self.push(Entry::Cue(Cue::Effect { label, effect }))
    }

    fn push(&mut self, entry: Entry) -> &mut Self {
        match self.open.last() {
            Some(id) => self.sections[id.0].entries.push(entry),
            None => self.top.push(entry),
        }
        self
    }

    fn open_section(&mut self, options: SectionOptions) -> Result<SectionId> {
        let SectionOptions {
            name,
            parallel,
            repeat,
        } = options;

        let existing = name.as_ref().and_then(|name| self.named.get(name).copied());
        let Some(id) = existing else {
            let id = SectionId(self.sections.len());
            if let Some(name) = &name {
                self.named.insert(name.clone(), id);
            }
            self.sections.push(SectionDraft {
                name,
                parallel: parallel.unwrap_or(false),
                repeat: repeat.unwrap_or_default(),
                entries: Vec::new(),
                linked: false,
            });
            return Ok(id);
        };

        if self.open.contains(&id) {
            return Err(Error::config(format!(
                "section '{}' cannot be opened inside itself",
                self.sections[id.0].label()
            )));
        }

        let draft = &mut self.sections[id.0];
        if let Some(parallel) = parallel {
            draft.parallel = parallel;
        }
        if let Some(repeat) = repeat {
            draft.repeat = repeat;
        }
        debug!(section = draft.label(), "re-opened section");
        Ok(id)
    }

    fn link(&mut self, id: SectionId) {
        if self.sections[id.0].linked {
            return;
        }
        self.sections[id.0].linked = true;
        self.push(Entry::Section(id));
    }

    fn compile(&self) -> Result<Vec<Arc<dyn Effect>>> {
        let fixtures = Arc::new(self.fixtures.clone());
        let mut visiting = vec![false; self.sections.len()];
        self.top
            .iter()
            .map(|entry| self.compile_entry(entry, &fixtures, &mut visiting))
            .collect()
    }

    fn compile_entry(
        &self,
        entry: &Entry,
        fixtures: &Arc<Fixtures>,
        visiting: &mut [bool],
    ) -> Result<Arc<dyn Effect>> {
        let id = match entry {
            Entry::Cue(cue) => return cue.compile(fixtures),
            Entry::Section(id) => *id,
        };

        let draft = &self.sections[id.0];
        if visiting[id.0] {
            return Err(Error::config(format!(
                "section '{}' contains itself",
                draft.label()
            )));
        }

        visiting[id.0] = true;
        let effects = draft
            .entries
            .iter()
            .map(|child| self.compile_entry(child, fixtures, visiting))
            .collect::<Result<Vec<_>>>()?;
        visiting[id.0] = false;

        Ok(Arc::new(
            Section::new(effects)
                .with_name(draft.name.clone())
                .with_parallel(draft.parallel)
                .with_repeat(draft.repeat),
        ))
    }

    fn outline_entry(&self, entry: &Entry) -> Outline {
        match entry {
            Entry::Cue(cue) => Outline::Effect(cue.label()),
            Entry::Section(id) => {
                let draft = &self.sections[id.0];
                Outline::Section {
                    name: draft.name.clone(),
                    parallel: draft.parallel,
                    repeat: draft.repeat,
                    children: draft
                        .entries
                        .iter()
                        .map(|child| self.outline_entry(child))
                        .collect(),
                }
            }
        }
    }
}
