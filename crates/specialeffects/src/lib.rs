//! # Special Effects
//!
//! Choreograph timed light changes, sounds, and custom actions into
//! sequential or parallel sections, with finite or unbounded repetition, run
//! cooperatively against asynchronous devices.
//!
//! ## Core Concepts
//!
//! - [`Effect`] = a unit of work with a [`Repeat`] policy
//! - [`Section`] = an effect grouping children sequentially or in parallel
//! - [`SpecialEffect`] = the registry of lights and sections, the builder,
//!   and the driver that plays the show
//!
//! ## Architecture
//!
//! ```text
//! SpecialEffect (builder)
//!     │ add_light / add_light_group ──► Fixtures
//!     │ add_* / section(...)        ──► section drafts
//!     │
//!     ▼ play()
//! compile drafts ──► Vec<Arc<dyn Effect>>
//!     │
//!     ├─► top-level effect 1 .run() ─┐
//!     │       Section                │ sequential: await each child
//!     │         ├─► child.run()      │ parallel:   join every child
//!     │         └─► forever child ───┼──► BackgroundTasks.spawn()
//!     ├─► top-level effect 2 .run()  │
//!     ▼                              │
//! join BackgroundTasks ◄─────────────┘
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Tree, not DAG** - every section is linked into exactly one parent
//! 2. **Re-opening extends** - a named section opened again is the same
//!    section, wherever it is already referenced
//! 3. **Repeat is sequential** - pass N+1 starts after pass N completed
//! 4. **Fan-out waits for all** - parallel branches all finish before
//!    failures are reported, collectively
//! 5. **Play joins the background** - `play` does not return while a
//!    background section is still running
//!
//! ## Example
//!
//! ```ignore
//! use specialeffects::{Easing, Repeat, SectionOptions, SpecialEffect};
//! use std::time::Duration;
//!
//! let mut show = SpecialEffect::new();
//! show.add_light("left", KasaLight::new("192.168.1.20"))
//!     .add_light("right", KasaLight::new("192.168.1.21"))
//!     .add_light_group("stage", ["left", "right"]);
//!
//! show.section(SectionOptions::new().repeat(Repeat::times(3)?), |fx| {
//!     fx.add_light_color_transition(
//!         "stage",
//!         (0, 100, 100),
//!         (240, 100, 100),
//!         Duration::from_secs(2),
//!         "sine_in_out".parse::<Easing>()?,
//!     );
//!     fx.add_sound("thunder.wav").add_delay(Duration::from_millis(500));
//!     Ok(())
//! })?;
//!
//! show.play()?;
//! ```
//!
//! ## Scheduling
//!
//! `play` drives everything from one thread. Suspension points are device
//! calls, sleeps, and colour samples; custom callables run on the blocking
//! pool. Timing is best effort.

mod color;
mod device;
mod easing;
mod effect;
mod error;
mod fixtures;
mod section;
mod special_effect;
mod tasks;

pub use crate::color::{
    interpolate, interpolate_over_time, interpolate_over_time_named, Hsv, SAMPLE_INTERVAL,
};
pub use crate::device::{Light, LightAction, SharedLight, SoundPlayer, SystemPlayer, PLAYER_ENV};
pub use crate::easing::Easing;
pub use crate::effect::{CustomEffect, Effect, LightEffect, Repeat, SoundEffect};
pub use crate::error::{Error, Result};
pub use crate::fixtures::{Fixture, Fixtures, Targets};
pub use crate::section::Section;
pub use crate::special_effect::{Outline, SectionOptions, SpecialEffect};
pub use crate::tasks::{BackgroundTasks, PlayContext};

// Re-export commonly used external types
pub use async_trait::async_trait;
