//! End-to-end runs of the applier against an in-memory SQLite database.

use std::fs;
use std::sync::Arc;

use dbpatch_core::{
    ApplierConfig, Database, Decision, DecisionKind, DirSource, DiscoveryError, Error, MarkerMode,
    Outcome, PatchApplier, Revision, RevisionStore, RunState, run,
};
use tempfile::{TempDir, tempdir};

struct Fixture {
    temp: TempDir,
    db: Arc<Database>,
}

impl Fixture {
    /// Patch directory with `files`, plus a `log` table the scripts write to
    fn new(files: &[(&str, &str)]) -> Self {
        let temp = tempdir().expect("Failed to create temp dir");
        for (name, sql) in files {
            fs::write(temp.path().join(name), sql).unwrap();
        }
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.execute_transaction("CREATE TABLE log (name TEXT NOT NULL)").unwrap();
        Self { temp, db }
    }

    fn store(&self) -> RevisionStore {
        RevisionStore::new(self.db.clone(), "patch")
    }

    fn with_marker(self, revision: u64) -> Self {
        let store = self.store();
        store.bootstrap().unwrap();
        if revision > 0 {
            store.advance(Revision::new(revision)).unwrap();
        }
        self
    }

    fn applier(&self, mode: MarkerMode) -> PatchApplier<DirSource> {
        let config = ApplierConfig::new().with_marker_mode(mode);
        PatchApplier::new(self.db.clone(), DirSource::new(self.temp.path()), config).unwrap()
    }

    fn marker(&self) -> dbpatch_core::Result<Revision> {
        self.store().current()
    }

    /// Names written by executed scripts, in execution order
    fn log(&self) -> Vec<String> {
        self.db
            .with_connection(|conn| {
                let mut stmt = conn.prepare("SELECT name FROM log ORDER BY rowid")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok(names)
            })
            .unwrap()
    }

    fn table_exists(&self, name: &str) -> bool {
        self.db
            .with_connection(|conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [name],
                    |row| row.get(0),
                )?;
                Ok(count > 0)
            })
            .unwrap()
    }
}

fn abc() -> Vec<(&'static str, &'static str)> {
    vec![
        ("1.sql", "INSERT INTO log (name) VALUES ('a');"),
        ("2.sql", "INSERT INTO log (name) VALUES ('b');"),
        ("3.sql", "INSERT INTO log (name) VALUES ('c');"),
    ]
}

#[test]
fn applies_pending_patches_in_order() {
    let fx = Fixture::new(&abc()).with_marker(1);
    let mut applier = fx.applier(MarkerMode::SameTransaction);

    let mut asked = Vec::new();
    let outcome = run(&mut applier, &mut |d: &Decision| {
        if let Decision::Apply { current, pending } = d {
            asked.push((*current, pending.iter().map(|u| u.name.clone()).collect::<Vec<_>>()));
        }
        true
    })
    .unwrap();

    assert_eq!(asked, vec![(Revision::new(1), vec!["2.sql".to_string(), "3.sql".to_string()])]);
    assert_eq!(fx.log(), vec!["b", "c"]);
    assert_eq!(fx.marker().unwrap(), Revision::new(3));

    match outcome {
        Outcome::Applied { from, to, units } => {
            assert_eq!(from, Revision::new(1));
            assert_eq!(to, Revision::new(3));
            let revisions: Vec<_> = units.iter().map(|u| u.revision.get()).collect();
            assert_eq!(revisions, vec![2, 3]);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(applier.state(), RunState::Done);
}

#[test]
fn successful_run_records_latest_revision() {
    let fx = Fixture::new(&abc()).with_marker(0);
    let mut applier = fx.applier(MarkerMode::Separate);

    let outcome = run(&mut applier, &mut |_: &Decision| true).unwrap();

    assert_eq!(outcome.revision(), Some(Revision::new(3)));
    assert_eq!(fx.marker().unwrap(), Revision::new(3));
    assert_eq!(fx.log(), vec!["a", "b", "c"]);
}

#[test]
fn rerun_with_nothing_pending_is_a_no_op() {
    let fx = Fixture::new(&abc()).with_marker(3);
    let mut applier = fx.applier(MarkerMode::SameTransaction);

    let mut decisions = 0;
    let outcome = run(&mut applier, &mut |_: &Decision| {
        decisions += 1;
        true
    })
    .unwrap();

    assert_eq!(outcome, Outcome::UpToDate { revision: Revision::new(3) });
    assert_eq!(decisions, 0);
    assert!(fx.log().is_empty());
    assert_eq!(fx.marker().unwrap(), Revision::new(3));
}

#[test]
fn failing_patch_stops_the_run() {
    let fx = Fixture::new(&[
        ("1.sql", "INSERT INTO log (name) VALUES ('a');"),
        ("2.sql", "INSERT INTO log (name) VALUES ('b'); INSERT INTO missing VALUES (1);"),
        ("3.sql", "INSERT INTO log (name) VALUES ('c');"),
    ])
    .with_marker(0);
    let mut applier = fx.applier(MarkerMode::SameTransaction);

    let err = run(&mut applier, &mut |_: &Decision| true).unwrap_err();

    match &err {
        Error::Transaction { revision, locator, .. } => {
            assert_eq!(*revision, Revision::new(2));
            assert!(locator.ends_with("2.sql"));
        }
        other => panic!("unexpected error: {other}"),
    }
    // r2's first insert was rolled back and r3 never ran
    assert_eq!(fx.log(), vec!["a"]);
    assert_eq!(fx.marker().unwrap(), Revision::new(1));
    assert_eq!(applier.state(), RunState::Aborted);
}

#[test]
fn next_run_resumes_at_the_failed_patch() {
    let fx = Fixture::new(&[
        ("1.sql", "INSERT INTO log (name) VALUES ('a');"),
        ("2.sql", "INSERT INTO missing VALUES (1);"),
        ("3.sql", "INSERT INTO log (name) VALUES ('c');"),
    ])
    .with_marker(0);

    assert!(run(&mut fx.applier(MarkerMode::Separate), &mut |_: &Decision| true).is_err());
    assert_eq!(fx.marker().unwrap(), Revision::new(1));

    fs::write(fx.temp.path().join("2.sql"), "INSERT INTO log (name) VALUES ('b');").unwrap();
    let outcome = run(&mut fx.applier(MarkerMode::Separate), &mut |_: &Decision| true).unwrap();

    assert_eq!(outcome.revision(), Some(Revision::new(3)));
    assert_eq!(fx.log(), vec!["a", "b", "c"]);
}

#[test]
fn declining_bootstrap_changes_nothing() {
    let fx = Fixture::new(&abc());
    let mut applier = fx.applier(MarkerMode::SameTransaction);

    let outcome = run(&mut applier, &mut |_: &Decision| false).unwrap();

    assert_eq!(
        outcome,
        Outcome::Declined {
            at: DecisionKind::Bootstrap,
            revision: None
        }
    );
    assert_eq!(applier.state(), RunState::Aborted);
    assert!(!fx.table_exists("patch"));
    assert!(fx.log().is_empty());
}

#[test]
fn accepting_bootstrap_creates_marker_before_applying() {
    let fx = Fixture::new(&abc());
    let store = fx.store();
    let mut applier = fx.applier(MarkerMode::SameTransaction);

    let mut seen = Vec::new();
    let outcome = run(&mut applier, &mut |d: &Decision| {
        if d.kind() == DecisionKind::Apply {
            // Marker already exists at 0 and nothing has run yet
            seen.push(store.current().unwrap());
        }
        true
    })
    .unwrap();

    assert_eq!(seen, vec![Revision::ZERO]);
    assert_eq!(outcome.revision(), Some(Revision::new(3)));
    assert_eq!(fx.log(), vec!["a", "b", "c"]);
}

#[test]
fn corrupt_marker_aborts_without_asking() {
    let fx = Fixture::new(&abc());
    fx.db
        .execute_transaction("CREATE TABLE patch (patch INTEGER NOT NULL)")
        .unwrap();
    let mut applier = fx.applier(MarkerMode::SameTransaction);

    let mut decisions = 0;
    let err = run(&mut applier, &mut |_: &Decision| {
        decisions += 1;
        true
    })
    .unwrap_err();

    match &err {
        Error::CorruptMarker { table, reason } => {
            assert_eq!(table, "patch");
            assert_eq!(reason, "no row");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(decisions, 0);
    assert_eq!(applier.state(), RunState::Aborted);
    assert!(fx.log().is_empty());
}

#[test]
fn revision_beyond_marker_range_is_rejected_before_any_change() {
    let fx = Fixture::new(&[
        ("1.sql", "INSERT INTO log (name) VALUES ('a');"),
        ("9223372036854775808_x.sql", "INSERT INTO log (name) VALUES ('x');"),
    ])
    .with_marker(0);
    let mut applier = fx.applier(MarkerMode::Separate);

    let err = run(&mut applier, &mut |_: &Decision| true).unwrap_err();

    assert!(matches!(err, Error::Discovery(DiscoveryError::InvalidRevision { .. })));
    assert!(!err.needs_reconciliation());
    assert!(fx.log().is_empty());
    assert_eq!(fx.marker().unwrap(), Revision::ZERO);
}

#[test]
fn sparse_timestamp_revisions_apply() {
    let fx = Fixture::new(&[
        ("20240101120000_init.sql", "INSERT INTO log (name) VALUES ('init');"),
        ("20240102090000_users.sql", "INSERT INTO log (name) VALUES ('users');"),
    ])
    .with_marker(0);

    let outcome = run(&mut fx.applier(MarkerMode::SameTransaction), &mut |_: &Decision| true).unwrap();

    assert_eq!(outcome.revision(), Some(Revision::new(20240102090000)));
    assert_eq!(fx.log(), vec!["init", "users"]);
}

#[test]
fn empty_source_aborts_before_any_change() {
    let fx = Fixture::new(&[("README.md", "not a patch")]).with_marker(0);
    let mut applier = fx.applier(MarkerMode::SameTransaction);

    let err = run(&mut applier, &mut |_: &Decision| true).unwrap_err();

    assert!(matches!(err, Error::Discovery(DiscoveryError::EmptySource(_))));
    assert_eq!(fx.marker().unwrap(), Revision::ZERO);
    assert_eq!(applier.state(), RunState::Aborted);
}

#[test]
fn duplicate_revisions_abort_before_any_change() {
    let fx = Fixture::new(&[
        ("1_a.sql", "INSERT INTO log (name) VALUES ('a');"),
        ("01_b.sql", "INSERT INTO log (name) VALUES ('b');"),
    ])
    .with_marker(0);

    let err = run(&mut fx.applier(MarkerMode::SameTransaction), &mut |_: &Decision| true).unwrap_err();

    assert!(matches!(err, Error::Discovery(DiscoveryError::Duplicate { .. })));
    assert!(fx.log().is_empty());
}

#[test]
fn gaps_are_applied_in_order() {
    let fx = Fixture::new(&[
        ("1.sql", "INSERT INTO log (name) VALUES ('a');"),
        ("10.sql", "INSERT INTO log (name) VALUES ('j');"),
        ("4.sql", "INSERT INTO log (name) VALUES ('d');"),
    ])
    .with_marker(0);

    let outcome = run(&mut fx.applier(MarkerMode::SameTransaction), &mut |_: &Decision| true).unwrap();

    assert_eq!(outcome.revision(), Some(Revision::new(10)));
    assert_eq!(fx.log(), vec!["a", "d", "j"]);
}

#[test]
fn separate_marker_update_failure_needs_reconciliation() {
    let fx = Fixture::new(&[
        ("1.sql", "INSERT INTO log (name) VALUES ('a');"),
        ("2.sql", "INSERT INTO log (name) VALUES ('b'); DROP TABLE patch;"),
        ("3.sql", "INSERT INTO log (name) VALUES ('c');"),
    ])
    .with_marker(0);

    let err = run(&mut fx.applier(MarkerMode::Separate), &mut |_: &Decision| true).unwrap_err();

    assert!(matches!(err, Error::MarkerAdvance { committed: true, .. }));
    assert!(err.needs_reconciliation());
    assert_eq!(err.revision(), Some(Revision::new(2)));
    // The script itself stuck, the marker did not
    assert_eq!(fx.log(), vec!["a", "b"]);
    assert!(!fx.table_exists("patch"));
}

#[test]
fn same_transaction_marker_failure_rolls_back_the_patch() {
    let fx = Fixture::new(&[
        ("1.sql", "INSERT INTO log (name) VALUES ('a');"),
        ("2.sql", "INSERT INTO log (name) VALUES ('b'); DROP TABLE patch;"),
    ])
    .with_marker(0);

    let err = run(&mut fx.applier(MarkerMode::SameTransaction), &mut |_: &Decision| true).unwrap_err();

    assert!(matches!(err, Error::MarkerAdvance { committed: false, .. }));
    assert!(!err.needs_reconciliation());
    assert_eq!(fx.log(), vec!["a"]);
    assert_eq!(fx.marker().unwrap(), Revision::new(1));
}
