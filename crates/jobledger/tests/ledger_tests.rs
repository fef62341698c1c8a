//! Durable ledger behavior across process restarts: ingest idempotence,
//! the transition table, and atomic artifact linking.

mod common;

use std::sync::Arc;

use common::{FakeRenderer, TestHarness};
use jobledger::{JobStatus, LedgerError, StatusFilter, TailorError};

const URLS: [&str; 3] = [
    "https://jobs.example.com/a",
    "https://careers.acme.io/b",
    "https://boards.widgets.dev/c",
];

#[test]
fn test_ingest_twice_across_restart_creates_no_duplicates() {
    let harness = TestHarness::new();
    let raw: Vec<_> = URLS.iter().map(|u| TestHarness::posting(u)).collect();

    assert_eq!(harness.store.ingest(&raw).unwrap(), 3);
    let before: Vec<String> = harness
        .store
        .list(&StatusFilter::default())
        .unwrap()
        .into_iter()
        .map(|j| j.job_id)
        .collect();

    let harness = harness.restart();
    assert_eq!(harness.store.ingest(&raw).unwrap(), 0);
    let after: Vec<String> = harness
        .store
        .list(&StatusFilter::default())
        .unwrap()
        .into_iter()
        .map(|j| j.job_id)
        .collect();

    assert_eq!(before, after);
    assert_eq!(harness.store.count().unwrap(), 3);
}

#[test]
fn test_job_id_is_stable_for_the_same_url() {
    let first = TestHarness::new();
    let second = TestHarness::new();

    let a = first.ingest_urls(&[URLS[0]]);
    let b = second.ingest_urls(&[URLS[0]]);

    assert_eq!(a[0].job_id, b[0].job_id);
}

#[test]
fn test_reingest_does_not_overwrite_progress() {
    let harness = TestHarness::new();
    let job = harness.ingest_urls(&[URLS[0]]).remove(0);
    harness
        .store
        .database()
        .with_conn(|conn| {
            conn.execute(
                "UPDATE jobs SET status = 'skipped' WHERE job_id = ?1",
                rusqlite::params![job.job_id],
            )?;
            Ok(())
        })
        .unwrap();

    harness.store.ingest(&[TestHarness::posting(URLS[0])]).unwrap();

    assert_eq!(harness.store.get(&job.job_id).unwrap().status, JobStatus::Skipped);
}

#[test]
fn test_rejected_transition_leaves_record_untouched() {
    let harness = TestHarness::new();
    let job = harness.ingest_urls(&[URLS[0]]).remove(0);

    for target in [JobStatus::Applying, JobStatus::Applied, JobStatus::Failed, JobStatus::Skipped] {
        let reason = (target == JobStatus::Failed).then_some("boom");
        let err = harness
            .store
            .update_status(&job.job_id, target, reason)
            .unwrap_err();
        assert!(
            matches!(err, LedgerError::InvalidTransition { from: JobStatus::Discovered, .. }),
            "discovered -> {} should be rejected, got {:?}",
            target,
            err
        );
    }

    let stored = harness.store.get(&job.job_id).unwrap();
    assert_eq!(stored, job);
}

#[test]
fn test_unknown_job_is_not_found() {
    let harness = TestHarness::new();

    let err = harness
        .store
        .update_status("does-not-exist", JobStatus::Skipped, None)
        .unwrap_err();

    assert!(matches!(err, LedgerError::NotFound(_)));
}

#[tokio::test]
async fn test_tailored_state_survives_restart() {
    let harness = TestHarness::new();
    let job = harness.ingest_urls(&[URLS[0]]).remove(0);
    harness.tailor_all(std::slice::from_ref(&job)).await;

    let harness = harness.restart();
    let stored = harness.store.get(&job.job_id).unwrap();
    let linker = harness.linker(Arc::new(FakeRenderer::default()));
    let current = linker.current(&job.job_id).unwrap();

    assert_eq!(stored.status, JobStatus::Tailored);
    assert_eq!(
        stored.artifact_path.as_deref(),
        Some(current.rendered_path.to_string_lossy().as_ref())
    );
    assert!(current.rendered_path.is_file());
}

#[tokio::test]
async fn test_render_failure_keeps_job_discovered() {
    let harness = TestHarness::new();
    let job = harness.ingest_urls(&[URLS[0]]).remove(0);
    let linker = harness.linker(Arc::new(FakeRenderer::failing("latex exploded")));

    let err = linker.tailor(&job, &harness.template()).await.unwrap_err();

    assert!(matches!(err, TailorError::Render(_)));
    let stored = harness.store.get(&job.job_id).unwrap();
    assert_eq!(stored.status, JobStatus::Discovered);
    assert!(stored.artifact_path.is_none());
    assert!(linker.history(&job.job_id).unwrap().is_empty());
}

#[tokio::test]
async fn test_fault_between_status_and_artifact_write_rolls_back_both() {
    let harness = TestHarness::new();
    let job = harness.ingest_urls(&[URLS[0]]).remove(0);
    harness
        .store
        .database()
        .with_conn(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER fail_artifact BEFORE INSERT ON artifacts
                 BEGIN SELECT RAISE(ABORT, 'injected fault'); END;",
            )?;
            Ok(())
        })
        .unwrap();
    let linker = harness.linker(Arc::new(FakeRenderer::default()));

    assert!(linker.tailor(&job, &harness.template()).await.is_err());

    let harness = harness.restart();
    let stored = harness.store.get(&job.job_id).unwrap();
    let linker = harness.linker(Arc::new(FakeRenderer::default()));
    assert_eq!(stored.status, JobStatus::Discovered);
    assert!(stored.artifact_path.is_none());
    assert!(linker.history(&job.job_id).unwrap().is_empty());
    let leftovers = std::fs::read_dir(&harness.artifact_dir)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_failed_relink_keeps_file_the_job_still_links() {
    let harness = TestHarness::new();
    let job = harness.ingest_urls(&[URLS[0]]).remove(0);
    let fixed = harness.artifact_dir.join("resume.pdf");
    let linker = harness.linker(Arc::new(FakeRenderer::fixed(fixed.clone())));

    let first = linker.tailor(&job, &harness.template()).await.unwrap();
    assert_eq!(first.rendered_path, fixed);

    harness
        .store
        .database()
        .with_conn(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER fail_artifact BEFORE INSERT ON artifacts
                 BEGIN SELECT RAISE(ABORT, 'injected fault'); END;",
            )?;
            Ok(())
        })
        .unwrap();
    assert!(linker.tailor(&job, &harness.template()).await.is_err());

    let stored = harness.store.get(&job.job_id).unwrap();
    assert_eq!(stored.status, JobStatus::Tailored);
    assert_eq!(
        stored.artifact_path.as_deref(),
        Some(fixed.to_string_lossy().as_ref())
    );
    assert!(fixed.is_file());
    assert_eq!(linker.history(&job.job_id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_one_rejected_job_does_not_stop_the_batch() {
    use jobledger::orchestrator::{tailor_batch, JobOutcome};

    let harness = TestHarness::new();
    let jobs = harness.ingest_urls(&URLS);
    let linker = harness.linker(Arc::new(FakeRenderer::default()));
    harness
        .store
        .database()
        .with_conn(|conn| {
            conn.execute(
                "UPDATE jobs SET status = 'skipped' WHERE job_id = ?1",
                rusqlite::params![jobs[1].job_id],
            )?;
            Ok(())
        })
        .unwrap();

    let report = tailor_batch(&linker, jobs.clone(), &harness.template(), 2).await;

    assert_eq!(report.jobs.len(), 3);
    assert!(matches!(report.jobs[0].outcome, JobOutcome::Tailored(_)));
    assert!(matches!(report.jobs[1].outcome, JobOutcome::Error(_)));
    assert!(matches!(report.jobs[2].outcome, JobOutcome::Tailored(_)));
    assert_eq!(
        harness
            .store
            .list(&StatusFilter::only(&[JobStatus::Tailored]))
            .unwrap()
            .len(),
        2
    );
}
