//! Patch discovery.
//!
//! Turns a source listing into a [`PatchSet`]. Naming convention:
//! - only `.sql` files (extension matched case-insensitively) are candidates
//! - hidden files are skipped
//! - the revision is the leading run of digits: `7.sql`, `0007_users.sql`, `12-index.sql`
//!
//! A candidate without leading digits, with revision 0 or a revision the marker
//! cannot store, or sharing a revision with another candidate fails the whole
//! discovery. So does a file name that is not valid UTF-8.

use tracing::{debug, warn};

use crate::error::{DiscoveryError, Result};
use crate::source::PatchSource;
use crate::types::{PatchSet, PatchUnit, Revision};

/// Extension a file needs to be considered a patch
pub const PATCH_EXTENSION: &str = "sql";

/// Scan `source` and build the ordered patch set.
///
/// An empty result is an error: nothing to do means the source is
/// misconfigured.
pub fn discover<S: PatchSource + ?Sized>(source: &S) -> Result<PatchSet> {
    let mut set = PatchSet::new();

    for entry in source.list()? {
        if !is_candidate(&entry.name) {
            debug!("Skipping non-patch file {}", entry.name);
            continue;
        }

        let revision = parse_revision(&entry.name)
            .ok_or_else(|| DiscoveryError::Unparsable(entry.locator.clone()))?;
        if revision.is_zero() || revision > Revision::MAX {
            return Err(DiscoveryError::InvalidRevision {
                locator: entry.locator,
                revision: revision.get(),
            }
            .into());
        }

        let unit = PatchUnit::new(revision, entry.locator, entry.name);
        if let Err(existing) = set.insert(unit.clone()) {
            return Err(DiscoveryError::Duplicate {
                revision,
                first: existing.locator,
                second: unit.locator,
            }
            .into());
        }
    }

    if set.is_empty() {
        return Err(DiscoveryError::EmptySource(source.describe()).into());
    }

    let gaps = set.gaps();
    if !gaps.is_empty() {
        let ranges: Vec<String> = gaps
            .iter()
            .map(|(start, end)| {
                if start == end {
                    start.to_string()
                } else {
                    format!("{}-{}", start, end)
                }
            })
            .collect();
        warn!(
            source = %source.describe(),
            missing = %ranges.join(", "),
            "patch sequence has gaps"
        );
    }

    debug!(source = %source.describe(), count = set.len(), "discovered patches");
    Ok(set)
}

/// Whether a file name follows the patch naming convention's shape
fn is_candidate(name: &str) -> bool {
    if name.starts_with('.') {
        return false;
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) => !stem.is_empty() && ext.eq_ignore_ascii_case(PATCH_EXTENSION),
        None => false,
    }
}

/// Derive a revision from the leading digits of a file name
pub fn parse_revision(name: &str) -> Option<Revision> {
    let digits: &str = {
        let end = name
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(name.len());
        &name[..end]
    };
    if digits.is_empty() {
        return None;
    }
    digits.parse::<u64>().ok().map(Revision::new)
}
