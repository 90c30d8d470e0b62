//! End-to-end scheduler runs against a scripted driver.

mod common;

use batchgen::pipeline::BatchCounters;
use batchgen::storage::{ArtifactLayout, FsPreconditions};
use common::{Harness, ScriptedDriver, Step, fast_config, identities, jobs};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::Ordering;

fn counters(total: u32, completed: u32, failed: u32, skipped: u32) -> BatchCounters {
    BatchCounters {
        total,
        completed,
        failed,
        skipped,
    }
}

fn distinct(identities: &[String]) -> bool {
    identities.iter().collect::<BTreeSet<_>>().len() == identities.len()
}

mod scenario_tests {
    use super::*;

    #[tokio::test]
    async fn test_retried_job_completes_on_third_identity() {
        let driver = ScriptedDriver::new().script(
            "B#3",
            &[Step::FailGeneration, Step::FailGeneration, Step::Succeed],
        );
        let harness = Harness::new(driver, fast_config());
        harness.scheduler.seed(jobs("B", 3));

        let summary = harness.scheduler.run(identities(&["a", "b", "c"])).await;

        assert_eq!(summary.totals, counters(3, 3, 0, 0));
        assert_eq!(summary.requeued, 2);
        assert!(summary.all_completed());
        assert_eq!(harness.finalizer.calls_for("B"), vec![counters(3, 3, 0, 0)]);

        let tried_by = harness.driver.submissions_of("B#3");
        assert_eq!(tried_by.len(), 3);
        assert!(distinct(&tried_by), "identity retried its own failure: {:?}", tried_by);
        assert!(harness.sink.records.lock().is_empty());
    }

    #[tokio::test]
    async fn test_existing_artifact_is_skipped_without_a_session() {
        let output = tempfile::tempdir().expect("Failed to create temp dir");
        let config = fast_config();
        let layout = ArtifactLayout::new(
            output.path().join("prompts"),
            output.path().join("videos"),
            config.generation_mode,
        );
        let artifact = layout.artifact_path("B", 1);
        std::fs::create_dir_all(artifact.parent().expect("artifact has a parent"))
            .expect("Failed to create batch dir");
        std::fs::write(&artifact, b"done").expect("Failed to write artifact");

        let preconditions = Arc::new(FsPreconditions::new(layout.clone(), false));
        let harness = Harness::build(ScriptedDriver::new(), config, layout, preconditions, output);
        harness.scheduler.seed(jobs("B", 1));

        let summary = harness.scheduler.run(identities(&["a"])).await;

        assert_eq!(summary.totals, counters(1, 0, 0, 1));
        assert_eq!(harness.finalizer.calls_for("B"), vec![counters(1, 0, 0, 1)]);
        assert_eq!(harness.driver.opens.load(Ordering::SeqCst), 0);
        assert!(harness.driver.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_job_failing_every_attempt_is_recorded_once() {
        let driver = ScriptedDriver::new().script("B#1", &[Step::FailGeneration; 3]);
        let harness = Harness::new(driver, fast_config());
        harness.scheduler.seed(jobs("B", 1));

        let summary = harness.scheduler.run(identities(&["a", "b", "c"])).await;

        assert_eq!(summary.totals, counters(1, 0, 1, 0));
        assert_eq!(summary.requeued, 2);
        assert_eq!(summary.stranded, 0);
        assert_eq!(harness.finalizer.calls_for("B"), vec![counters(1, 0, 1, 0)]);

        let records = harness.sink.records.lock().clone();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, "B#1");
        assert_eq!(records[0].1, 3);
        assert_eq!(harness.driver.submissions_of("B#1").len(), 3);
    }

    #[tokio::test]
    async fn test_failed_jobs_move_to_other_identities() {
        let mut driver = ScriptedDriver::new();
        for seq in 1..=4 {
            driver = driver.script(&format!("B#{}", seq), &[Step::FailGeneration, Step::Succeed]);
        }
        let mut config = fast_config();
        config.max_slots_per_session = 2;
        let harness = Harness::new(driver, config);
        harness.scheduler.seed(jobs("B", 4));

        let summary = harness.scheduler.run(identities(&["a", "b"])).await;

        assert_eq!(summary.totals, counters(4, 4, 0, 0));
        for seq in 1..=4 {
            let tried_by = harness.driver.submissions_of(&format!("B#{}", seq));
            assert_eq!(tried_by.len(), 2);
            assert!(distinct(&tried_by), "B#{} tried by {:?}", seq, tried_by);
        }
    }

    #[tokio::test]
    async fn test_stalled_generation_times_out_and_retries() {
        let driver = ScriptedDriver::new().script("B#1", &[Step::Stall, Step::Succeed]);
        let harness = Harness::new(driver, fast_config());
        harness.scheduler.seed(jobs("B", 1));

        let summary = harness.scheduler.run(identities(&["a", "b"])).await;

        assert_eq!(summary.totals, counters(1, 1, 0, 0));
        assert_eq!(summary.requeued, 1);
        assert_eq!(harness.driver.submissions_of("B#1").len(), 2);
    }
}

mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_download_and_submit_failures_count_as_attempts() {
        let driver = ScriptedDriver::new()
            .script("B#1", &[Step::DownloadMissing, Step::Succeed])
            .script("B#2", &[Step::FailSubmit, Step::Succeed]);
        let harness = Harness::new(driver, fast_config());
        harness.scheduler.seed(jobs("B", 2));

        let summary = harness.scheduler.run(identities(&["a", "b"])).await;

        assert_eq!(summary.totals, counters(2, 2, 0, 0));
        assert_eq!(summary.requeued, 2);
        // Every opened session is closed, including the one whose submit failed.
        assert_eq!(
            harness.driver.opens.load(Ordering::SeqCst),
            harness.driver.closes.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn test_job_without_eligible_identity_is_drained_as_failed() {
        let driver = ScriptedDriver::new().script("B#1", &[Step::FailGeneration; 2]);
        let harness = Harness::new(driver, fast_config());
        harness.scheduler.seed(jobs("B", 1));

        let summary = harness.scheduler.run(identities(&["a", "b"])).await;

        assert_eq!(summary.totals, counters(1, 0, 1, 0));
        assert_eq!(summary.stranded, 1);
        assert!(!summary.all_completed());
        assert_eq!(harness.finalizer.calls_for("B"), vec![counters(1, 0, 1, 0)]);

        let records = harness.sink.records.lock().clone();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].1, 2);
    }

    #[tokio::test]
    async fn test_lost_session_requeues_its_jobs() {
        let driver = ScriptedDriver::new()
            .script("B#1", &[Step::CrashSession, Step::Succeed])
            .script("B#2", &[Step::Stall, Step::Succeed, Step::Succeed]);
        let mut config = fast_config();
        config.max_concurrent_sessions = 1;
        config.max_slots_per_session = 2;
        let harness = Harness::new(driver, config);
        harness.scheduler.seed(jobs("B", 2));

        let summary = harness.scheduler.run(identities(&["a", "b", "c"])).await;

        assert_eq!(summary.totals, counters(2, 2, 0, 0));
        assert_eq!(summary.sessions_lost, 1);
        assert!(summary.sessions_launched >= 2);
        assert_eq!(
            harness.driver.launches.load(Ordering::SeqCst),
            harness.driver.shutdowns.load(Ordering::SeqCst)
        );

        let tried_by = harness.driver.submissions_of("B#1");
        assert_eq!(tried_by.len(), 2);
        assert!(distinct(&tried_by));
        assert!(distinct(&harness.driver.submissions_of("B#2")));
        assert_eq!(harness.finalizer.calls_for("B").len(), 1);
    }
}

mod rotation_tests {
    use super::*;

    #[tokio::test]
    async fn test_capped_sessions_rotate_through_identities() {
        let driver = ScriptedDriver::new().script("A#1", &[Step::FailGeneration, Step::Succeed]);
        let mut config = fast_config();
        config.max_concurrent_sessions = 1;
        let harness = Harness::new(driver, config);
        let mut seeded = jobs("A", 2);
        seeded.extend(jobs("B", 1));
        harness.scheduler.seed(seeded);

        let summary = harness.scheduler.run(identities(&["a", "b"])).await;

        assert_eq!(summary.totals, counters(3, 3, 0, 0));
        assert_eq!(summary.sessions_launched, 2);
        assert_eq!(harness.finalizer.calls_for("A"), vec![counters(2, 2, 0, 0)]);
        assert_eq!(harness.finalizer.calls_for("B"), vec![counters(1, 1, 0, 0)]);
        assert_eq!(harness.driver.submissions_of("A#1"), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_no_identities_leaves_jobs_stranded() {
        let harness = Harness::new(ScriptedDriver::new(), fast_config());
        harness.scheduler.seed(jobs("B", 2));

        let summary = harness.scheduler.run(Vec::new()).await;

        assert_eq!(summary.totals, counters(2, 0, 2, 0));
        assert_eq!(summary.stranded, 2);
        assert_eq!(summary.sessions_launched, 0);
        assert_eq!(harness.driver.launches.load(Ordering::SeqCst), 0);
    }
}
