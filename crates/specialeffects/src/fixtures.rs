//! Named lights and light groups.

use std::collections::HashMap;

use smallvec::SmallVec;
use tracing::warn;

use crate::device::{LightAction, SharedLight};
use crate::error::{Error, Result};

/// A registered light together with the name it was registered under.
#[derive(Clone)]
pub struct Fixture {
    name: String,
    light: SharedLight,
}

impl Fixture {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Apply `action`, tagging failures with this fixture's name.
    pub async fn apply(&self, action: LightAction) -> Result<()> {
        action
            .apply(self.light.as_ref())
            .await
            .map_err(|source| Error::Device {
                target: self.name.clone(),
                source,
            })
    }
}

/// Lights resolved from a single name.
pub type Targets = SmallVec<[Fixture; 4]>;

/// Light and group registry.
///
/// Groups are snapshots: members are looked up when the group is created, so
/// lights registered afterwards are not part of it.
#[derive(Clone, Default)]
pub struct Fixtures {
    lights: HashMap<String, Fixture>,
    groups: HashMap<String, Vec<Fixture>>,
}

impl Fixtures {
    pub fn insert_light(&mut self, name: impl Into<String>, light: SharedLight) {
        let name = name.into();
        self.lights.insert(name.clone(), Fixture { name, light });
    }

    /// Create or replace a group from already registered lights.
    ///
    /// Unknown member names are skipped with a warning. Returns the number of
    /// members that made it into the group.
    pub fn insert_group<I, S>(&mut self, name: impl Into<String>, members: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let name = name.into();
        let mut fixtures = Vec::new();
        for member in members {
            let member = member.as_ref();
            match self.lights.get(member) {
                Some(fixture) => fixtures.push(fixture.clone()),
                None => warn!(group = %name, light = member, "skipping unregistered group member"),
            }
        }
        let len = fixtures.len();
        self.groups.insert(name, fixtures);
        len
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lights.contains_key(name) || self.groups.contains_key(name)
    }

    /// Resolve a light or group name. Lights win over groups of the same name.
    pub fn resolve(&self, name: &str) -> Result<Targets> {
        if let Some(fixture) = self.lights.get(name) {
            let mut targets = Targets::new();
            targets.push(fixture.clone());
            return Ok(targets);
        }
        self.groups
            .get(name)
            .map(|members| members.iter().cloned().collect())
            .ok_or_else(|| Error::TargetNotFound(name.to_string()))
    }
}
