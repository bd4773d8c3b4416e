//! Patch application state machine.
//!
//! ```text
//! Idle ──start──▶ AwaitingBootstrapDecision ──yes──┐
//!   │                        │ no                   │
//!   │                        ▼                      ▼
//!   │                     Aborted            (discover at 0)
//!   └──────────(discover at current)────────────────┤
//!                                                   ▼
//!                  Done ◀── nothing pending ── AwaitingApplyConfirmation
//!                   ▲                               │ yes          │ no
//!                   └──────── all applied ─── Applying ──error──▶ Aborted
//! ```
//!
//! The two operator decisions are explicit suspension points: [`PatchApplier::start`]
//! and [`PatchApplier::resume`] return a [`Step`], and a [`Step::Decide`] is
//! answered by calling `resume` with the operator's answer. [`run`] drives the
//! machine to completion against a [`Gate`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{error, info, info_span, trace, warn};

use crate::config::{ApplierConfig, MarkerMode};
use crate::db::Database;
use crate::discovery;
use crate::error::{Error, Result};
use crate::revision::RevisionStore;
use crate::source::PatchSource;
use crate::types::{PatchSet, PatchUnit, Revision};

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// Observable state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Idle,
    AwaitingBootstrapDecision,
    AwaitingApplyConfirmation,
    Applying,
    Done,
    Aborted,
}

/// Which question the operator was asked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DecisionKind {
    Bootstrap,
    Apply,
}

/// A question the run needs answered before it can continue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The marker table is missing; create it at revision 0?
    Bootstrap { table: String },
    /// Apply these patches, in this order?
    Apply {
        current: Revision,
        pending: Vec<PatchUnit>,
    },
}

impl Decision {
    pub fn kind(&self) -> DecisionKind {
        match self {
            Decision::Bootstrap { .. } => DecisionKind::Bootstrap,
            Decision::Apply { .. } => DecisionKind::Apply,
        }
    }
}

/// One successfully applied and recorded patch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedUnit {
    pub revision: Revision,
    pub locator: String,
    pub elapsed: Duration,
}

/// How a run ended when it did not fail
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Outcome {
    /// Every pending patch was applied
    Applied {
        from: Revision,
        to: Revision,
        units: Vec<AppliedUnit>,
    },
    /// Nothing was pending
    UpToDate { revision: Revision },
    /// The operator said no; nothing was changed by the declined step
    Declined {
        at: DecisionKind,
        revision: Option<Revision>,
    },
}

impl Outcome {
    /// Marker value at the end of the run, if the marker exists
    pub fn revision(&self) -> Option<Revision> {
        match self {
            Outcome::Applied { to, .. } => Some(*to),
            Outcome::UpToDate { revision } => Some(*revision),
            Outcome::Declined { revision, .. } => *revision,
        }
    }
}

/// Result of advancing the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Decide(Decision),
    Finished(Outcome),
}

/// Read-only view of where a database stands
#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    /// `None` when the marker table does not exist yet
    pub current: Option<Revision>,
    pub patches: Vec<PatchUnit>,
    pub pending: Vec<PatchUnit>,
}

/// Answers decision requests (an operator, a flag, or a test)
pub trait Gate {
    fn confirm(&mut self, decision: &Decision) -> Result<bool>;
}

impl<F> Gate for F
where
    F: FnMut(&Decision) -> bool,
{
    fn confirm(&mut self, decision: &Decision) -> Result<bool> {
        Ok(self(decision))
    }
}

/// Gate that accepts every decision
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Gate for AssumeYes {
    fn confirm(&mut self, _decision: &Decision) -> Result<bool> {
        Ok(true)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Applier
// ─────────────────────────────────────────────────────────────────────────────

enum State {
    Idle,
    AwaitingBootstrap,
    AwaitingApply {
        current: Revision,
        pending: Vec<PatchUnit>,
    },
    Applying,
    Done,
    Aborted,
}

/// Applies pending patches in revision order, one transaction each
pub struct PatchApplier<S> {
    db: Arc<Database>,
    store: RevisionStore,
    source: S,
    config: ApplierConfig,
    state: State,
}

impl<S: PatchSource> PatchApplier<S> {
    /// Create an applier.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not validate.
    pub fn new(db: Arc<Database>, source: S, config: ApplierConfig) -> Result<Self> {
        config.validate()?;
        let store = RevisionStore::new(db.clone(), config.marker_table.clone());
        Ok(Self {
            db,
            store,
            source,
            config,
            state: State::Idle,
        })
    }

    pub fn state(&self) -> RunState {
        match self.state {
            State::Idle => RunState::Idle,
            State::AwaitingBootstrap => RunState::AwaitingBootstrapDecision,
            State::AwaitingApply { .. } => RunState::AwaitingApplyConfirmation,
            State::Applying => RunState::Applying,
            State::Done => RunState::Done,
            State::Aborted => RunState::Aborted,
        }
    }

    /// Begin the run: read the marker, then discover patches.
    pub fn start(&mut self) -> Result<Step> {
        if !matches!(self.state, State::Idle) {
            return Err(Error::InvalidState(format!(
                "start called in state {:?}",
                self.state()
            )));
        }

        match self.store.current() {
            Ok(current) => {
                info!(patch = %current, "found patch#{}", current);
                self.discover(current)
            }
            Err(e) if e.is_uninitialized() => {
                warn!(table = %self.store.table(), "{}", e);
                self.state = State::AwaitingBootstrap;
                Ok(Step::Decide(Decision::Bootstrap {
                    table: self.store.table().to_string(),
                }))
            }
            Err(e) => {
                error!(error = %e, "failed to identify patch number");
                Err(self.abort(e))
            }
        }
    }

    /// Continue after a [`Step::Decide`] with the operator's answer
    pub fn resume(&mut self, answer: bool) -> Result<Step> {
        match std::mem::replace(&mut self.state, State::Aborted) {
            State::AwaitingBootstrap => {
                if !answer {
                    info!("exit without creating patch table");
                    return Ok(Step::Finished(Outcome::Declined {
                        at: DecisionKind::Bootstrap,
                        revision: None,
                    }));
                }
                if let Err(e) = self.store.bootstrap() {
                    error!(error = %e, "failed to create patch table");
                    return Err(self.abort(e));
                }
                self.discover(Revision::ZERO)
            }
            State::AwaitingApply { current, pending } => {
                if !answer {
                    info!("not applying patches");
                    return Ok(Step::Finished(Outcome::Declined {
                        at: DecisionKind::Apply,
                        revision: Some(current),
                    }));
                }
                self.apply(current, pending).map(Step::Finished)
            }
            other => {
                self.state = other;
                Err(Error::InvalidState(format!(
                    "no decision pending in state {:?}",
                    self.state()
                )))
            }
        }
    }

    /// Report the marker and pending patches without changing anything
    pub fn preview(&self) -> Result<Preview> {
        let current = match self.store.current() {
            Ok(current) => Some(current),
            Err(e) if e.is_uninitialized() => None,
            Err(e) => return Err(e),
        };
        let set = discovery::discover(&self.source)?;
        let pending = set
            .pending(current.unwrap_or(Revision::ZERO))
            .cloned()
            .collect();

        Ok(Preview {
            current,
            patches: set.iter().cloned().collect(),
            pending,
        })
    }

    fn discover(&mut self, current: Revision) -> Result<Step> {
        let set = match discovery::discover(&self.source) {
            Ok(set) => set,
            Err(e) => {
                error!(error = %e, "no usable patches found");
                return Err(self.abort(e));
            }
        };

        let pending: Vec<PatchUnit> = set.pending(current).cloned().collect();
        if pending.is_empty() {
            self.warn_if_ahead(current, &set);
            info!(patch = %current, "already up to date");
            self.state = State::Done;
            return Ok(Step::Finished(Outcome::UpToDate { revision: current }));
        }

        for unit in &pending {
            trace!(revision = %unit.revision, file = %unit.locator, "queue patch");
        }

        self.state = State::AwaitingApply {
            current,
            pending: pending.clone(),
        };
        Ok(Step::Decide(Decision::Apply { current, pending }))
    }

    fn apply(&mut self, from: Revision, pending: Vec<PatchUnit>) -> Result<Outcome> {
        self.state = State::Applying;

        // `pending` comes out of a PatchSet, so revisions strictly increase
        let mut units = Vec::with_capacity(pending.len());
        let mut reached = from;
        for unit in &pending {
            match self.apply_unit(unit) {
                Ok(applied) => {
                    reached = applied.revision;
                    units.push(applied);
                }
                Err(e) => {
                    error!(
                        revision = %unit.revision,
                        file = %unit.locator,
                        recorded = %reached,
                        error = %e,
                        "failed to patch"
                    );
                    if e.needs_reconciliation() {
                        error!(
                            revision = %unit.revision,
                            "patch committed but not recorded; fix the marker before the next run"
                        );
                    }
                    return Err(self.abort(e));
                }
            }
        }

        info!(patch = %reached, applied = units.len(), "done");
        self.state = State::Done;
        Ok(Outcome::Applied {
            from,
            to: reached,
            units,
        })
    }

    fn apply_unit(&self, unit: &PatchUnit) -> Result<AppliedUnit> {
        let span = info_span!("patch", revision = %unit.revision, file = %unit.locator);
        let _enter = span.enter();

        let started = Instant::now();
        let sql = self.source.read(&unit.locator).map_err(|source| Error::Read {
            revision: unit.revision,
            locator: unit.locator.clone(),
            source,
        })?;

        let as_transaction_error = |e: Error| match e {
            Error::Connectivity(source) => Error::Transaction {
                revision: unit.revision,
                locator: unit.locator.clone(),
                elapsed: started.elapsed(),
                source,
            },
            other => other,
        };
        let as_marker_error = |e: Error, committed: bool| Error::MarkerAdvance {
            revision: unit.revision,
            locator: unit.locator.clone(),
            committed,
            source: Box::new(e),
        };

        match self.config.marker_mode {
            MarkerMode::SameTransaction => {
                self.db
                    .with_transaction(|conn| {
                        conn.execute_batch(&sql).map_err(|e| as_transaction_error(e.into()))?;
                        self.store
                            .advance_on(conn, unit.revision)
                            .map_err(|e| as_marker_error(e, false))
                    })
                    // A failed commit means the script did not stick either
                    .map_err(as_transaction_error)?;
            }
            MarkerMode::Separate => {
                self.db.execute_transaction(&sql).map_err(as_transaction_error)?;
                self.store
                    .advance(unit.revision)
                    .map_err(|e| as_marker_error(e, true))?;
            }
        }

        let elapsed = started.elapsed();
        info!(
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "applied patch"
        );
        Ok(AppliedUnit {
            revision: unit.revision,
            locator: unit.locator.clone(),
            elapsed,
        })
    }

    fn warn_if_ahead(&self, current: Revision, set: &PatchSet) {
        if let Some(latest) = set.latest() {
            if current > latest {
                warn!(
                    patch = %current,
                    latest = %latest,
                    "marker is ahead of the newest patch file"
                );
            }
        }
    }

    fn abort(&mut self, e: Error) -> Error {
        self.state = State::Aborted;
        e
    }
}

/// Drive `applier` to completion, asking `gate` at each decision point.
pub fn run<S, G>(applier: &mut PatchApplier<S>, gate: &mut G) -> Result<Outcome>
where
    S: PatchSource,
    G: Gate + ?Sized,
{
    let mut step = applier.start()?;
    loop {
        match step {
            Step::Finished(outcome) => return Ok(outcome),
            Step::Decide(decision) => {
                let answer = gate.confirm(&decision)?;
                step = applier.resume(answer)?;
            }
        }
    }
}
