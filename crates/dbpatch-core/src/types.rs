//! Shared types for dbpatch-core.
//!
//! A run works on a [`PatchSet`]: every discovered [`PatchUnit`] keyed by its
//! [`Revision`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Revision
// ─────────────────────────────────────────────────────────────────────────────

/// Position of a patch in the total order.
///
/// Revision 0 means "nothing applied yet"; patches start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(u64);

impl Revision {
    /// The marker value of a freshly bootstrapped database
    pub const ZERO: Revision = Revision(0);

    /// Highest revision the marker column (a signed 64-bit integer) can hold
    pub const MAX: Revision = Revision(i64::MAX as u64);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Revision {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Patch Types
// ─────────────────────────────────────────────────────────────────────────────

/// A single change script, immutable once discovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchUnit {
    pub revision: Revision,
    /// Where the script content is read from (a file path for directory sources)
    pub locator: String,
    /// File name the revision was derived from
    pub name: String,
}

impl PatchUnit {
    pub fn new(revision: Revision, locator: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            revision,
            locator: locator.into(),
            name: name.into(),
        }
    }
}

/// Every discovered patch, ordered by revision with no duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatchSet {
    units: BTreeMap<Revision, PatchUnit>,
}

impl PatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a unit, handing back the one it collided with.
    ///
    /// The existing entry is kept on collision.
    pub(crate) fn insert(&mut self, unit: PatchUnit) -> Result<(), PatchUnit> {
        match self.units.get(&unit.revision) {
            Some(existing) => Err(existing.clone()),
            None => {
                self.units.insert(unit.revision, unit);
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn get(&self, revision: Revision) -> Option<&PatchUnit> {
        self.units.get(&revision)
    }

    /// Highest discovered revision
    pub fn latest(&self) -> Option<Revision> {
        self.units.keys().next_back().copied()
    }

    /// All units in increasing revision order
    pub fn iter(&self) -> impl Iterator<Item = &PatchUnit> {
        self.units.values()
    }

    /// Units with a revision strictly greater than `current`, in order
    pub fn pending(&self, current: Revision) -> impl Iterator<Item = &PatchUnit> {
        self.units
            .range((std::ops::Bound::Excluded(current), std::ops::Bound::Unbounded))
            .map(|(_, unit)| unit)
    }

    /// Inclusive ranges of revisions missing between 1 and the latest one.
    ///
    /// Computed from neighbouring revisions, so a sparse set such as a single
    /// date-named patch costs one range rather than one entry per hole.
    pub fn gaps(&self) -> Vec<(Revision, Revision)> {
        let mut missing = Vec::new();
        let mut previous = 0;
        for revision in self.units.keys() {
            if revision.get() > previous + 1 {
                missing.push((Revision::new(previous + 1), Revision::new(revision.get() - 1)));
            }
            previous = revision.get();
        }
        missing
    }
}
