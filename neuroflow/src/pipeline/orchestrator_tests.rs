//! Orchestrator tests over mock stages.

use super::*;
use crate::cancellation::CancellationToken;
use crate::core::{Scan, StageName, StageStatus};
use crate::events::{self, CollectingEventSink};
use crate::stages::Stage;
use crate::testing::{
    assert_failed_at, assert_scan_status, assert_volume_exists, mock_stages, mock_volume_bytes,
    CallLog, MockStage, TestWorkspace,
};
use crate::utils::sha256_file;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn pipeline_of(stages: Vec<MockStage>) -> Pipeline {
    stages
        .into_iter()
        .try_fold(PipelineBuilder::new(), |b, s| b.stage(Arc::new(s) as Arc<dyn Stage>))
        .and_then(PipelineBuilder::build)
        .unwrap()
}

/// Four logging mock stages with `tweak` applied to the one named `stage`.
fn stages_with(
    log: &CallLog,
    stage: StageName,
    tweak: impl FnOnce(MockStage) -> MockStage,
) -> Vec<MockStage> {
    let mut stages = mock_stages(log);
    let target = stages.remove(stage.index());
    stages.insert(stage.index(), tweak(target));
    stages
}

fn setup(subjects: &[&str]) -> (TempDir, TestWorkspace, Vec<Scan>) {
    let dir = tempfile::tempdir().unwrap();
    let ws = TestWorkspace::create(dir.path()).unwrap();
    let scans = subjects
        .iter()
        .map(|s| {
            let path = ws.write_scan(s, format!("raw-{s}").as_bytes()).unwrap();
            Scan::new(*s, path)
        })
        .collect();
    (dir, ws, scans)
}

fn expected_mask(subject: &str) -> Vec<u8> {
    StageName::ALL
        .iter()
        .fold(format!("raw-{subject}").into_bytes(), |bytes, stage| {
            mock_volume_bytes(*stage, &bytes)
        })
}

#[tokio::test]
async fn test_single_scan_produces_exactly_one_mask() {
    let (_dir, ws, scans) = setup(&["subjectA"]);
    let log = CallLog::new();
    let orchestrator = Orchestrator::new(pipeline_of(mock_stages(&log)), ws.paths());

    let report = orchestrator.run(&scans).await;

    assert_scan_status(&report, "subjectA", ScanStatus::Succeeded);
    assert!(report.all_succeeded());
    let masks: Vec<String> = ws
        .output_files()
        .unwrap()
        .into_iter()
        .filter(|f| f.ends_with("_mask.nii.gz"))
        .collect();
    assert_eq!(masks, vec!["subjectA_mask.nii.gz"]);

    let mask = ws.paths().mask("subjectA");
    assert_eq!(std::fs::read(&mask).unwrap(), expected_mask("subjectA"));

    let scan = report.scan("subjectA").unwrap();
    assert_eq!(scan.mask.as_deref(), Some(mask.as_path()));
    assert_eq!(scan.mask_sha256, Some(sha256_file(&mask).await.unwrap()));
    assert_eq!(scan.stages.len(), 4);
}

#[tokio::test]
async fn test_stage_order_and_input_chaining() {
    let (_dir, ws, scans) = setup(&["subjectA", "subjectB"]);
    let log = CallLog::new();
    let stages = mock_stages(&log);
    let paths = ws.paths();

    let stage_refs: Vec<Arc<MockStage>> = stages.into_iter().map(Arc::new).collect();
    let pipeline = stage_refs
        .iter()
        .try_fold(PipelineBuilder::new(), |b, s| b.stage(s.clone() as Arc<dyn Stage>))
        .and_then(PipelineBuilder::build)
        .unwrap();

    Orchestrator::new(pipeline, paths.clone()).run(&scans).await;

    for subject in ["subjectA", "subjectB"] {
        assert_eq!(log.stages_for(subject), StageName::ALL.to_vec());
    }

    for stage in &stage_refs {
        for ctx in stage.recorded_contexts() {
            let expected_input = match ctx.stage().previous() {
                Some(prev) => paths.output(ctx.subject_id(), prev),
                None => ws.input_dir().join(format!("{}.nii.gz", ctx.subject_id())),
            };
            assert_eq!(ctx.input(), expected_input.as_path());
            assert_eq!(ctx.output(), paths.output(ctx.subject_id(), ctx.stage()).as_path());
        }
    }
}

#[tokio::test]
async fn test_extraction_failure_writes_no_mask_and_continues() {
    let (_dir, ws, scans) = setup(&["subjectA", "subjectB"]);
    let log = CallLog::new();
    let stages = stages_with(&log, StageName::Extraction, |s| s.fail_for("subjectB"));
    let sink = Arc::new(CollectingEventSink::new());
    let orchestrator =
        Orchestrator::new(pipeline_of(stages), ws.paths()).with_event_sink(sink.clone());

    let report = orchestrator.run(&scans).await;

    assert_scan_status(&report, "subjectA", ScanStatus::Succeeded);
    assert_failed_at(&report, "subjectB", StageName::Extraction);
    assert_volume_exists(&ws.paths().mask("subjectA"));
    assert!(!ws.paths().mask("subjectB").exists());
    assert_eq!(log.stages_for("subjectB"), vec![StageName::Extraction]);

    let failed = sink.events_of_type(events::SCAN_FAILED);
    assert_eq!(failed.len(), 1);
    let data = failed[0].1.clone().unwrap();
    assert_eq!(data["subject_id"], "subjectB");
    assert_eq!(data["stage"], "extraction");
    assert!(report.cancel_reason.is_none());
}

#[tokio::test]
async fn test_missing_output_fails_scan() {
    let (_dir, ws, scans) = setup(&["subjectA"]);
    let log = CallLog::new();
    let stages = stages_with(&log, StageName::Normalization, |s| {
        s.skip_output_for("subjectA")
    });

    let report = Orchestrator::new(pipeline_of(stages), ws.paths())
        .run(&scans)
        .await;

    assert_failed_at(&report, "subjectA", StageName::Normalization);
    let error = report.scan("subjectA").unwrap().error.clone().unwrap();
    assert!(error.contains("produced no output"), "{error}");
    assert!(!ws.paths().mask("subjectA").exists());
}

#[tokio::test]
async fn test_stale_output_from_previous_run_is_not_accepted() {
    let (_dir, ws, scans) = setup(&["subjectA"]);
    let paths = ws.paths();
    let stale = paths.output("subjectA", StageName::Extraction);
    std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
    std::fs::write(&stale, b"stale volume").unwrap();

    let log = CallLog::new();
    let stages = stages_with(&log, StageName::Extraction, |s| s.skip_output_for("subjectA"));
    let report = Orchestrator::new(pipeline_of(stages), paths).run(&scans).await;

    assert_failed_at(&report, "subjectA", StageName::Extraction);
    assert!(!stale.exists());
}

#[tokio::test]
async fn test_output_other_than_declared_fails_scan() {
    let (dir, ws, scans) = setup(&["subjectA"]);
    let log = CallLog::new();
    let elsewhere = dir.path().join("elsewhere.nii.gz");
    let stages = stages_with(&log, StageName::Registration, |s| {
        s.report_output_for("subjectA", &elsewhere)
    });

    let report = Orchestrator::new(pipeline_of(stages), ws.paths())
        .run(&scans)
        .await;

    assert_failed_at(&report, "subjectA", StageName::Registration);
    assert_eq!(log.stages_for("subjectA").len(), 2);
}

#[tokio::test]
async fn test_fail_fast_skips_remaining_scans() {
    let (_dir, ws, scans) = setup(&["subjectA", "subjectB", "subjectC"]);
    let log = CallLog::new();
    let stages = stages_with(&log, StageName::Registration, |s| s.fail_for("subjectB"));
    let sink = Arc::new(CollectingEventSink::new());
    let token = Arc::new(CancellationToken::new());
    let orchestrator = Orchestrator::new(pipeline_of(stages), ws.paths())
        .with_failure_mode(FailureMode::FailFast)
        .with_event_sink(sink.clone())
        .with_cancellation(token.clone());

    let report = orchestrator.run(&scans).await;

    assert_scan_status(&report, "subjectA", ScanStatus::Succeeded);
    assert_failed_at(&report, "subjectB", StageName::Registration);
    assert_scan_status(&report, "subjectC", ScanStatus::Skipped);
    assert!(log.stages_for("subjectC").is_empty());
    assert!(!ws.paths().mask("subjectC").exists());
    assert_eq!(
        report.cancel_reason.as_deref(),
        Some("scan 'subjectB' failed at stage registration")
    );
    assert_eq!(sink.events_for_subject("subjectC"), vec![events::SCAN_SKIPPED]);
    assert!(token.is_cancelled());
}

#[tokio::test]
async fn test_fail_fast_stops_in_flight_scans_between_stages() {
    let (_dir, ws, scans) = setup(&["subjectA", "subjectB"]);
    let log = CallLog::new();
    let stages: Vec<MockStage> = mock_stages(&log)
        .into_iter()
        .map(|s| match s.name() {
            StageName::Extraction => s.fail_for("subjectB"),
            StageName::Registration => s.with_delay(Duration::from_millis(200)),
            _ => s,
        })
        .collect();

    let report = Orchestrator::new(pipeline_of(stages), ws.paths())
        .with_failure_mode(FailureMode::FailFast)
        .with_max_concurrent_scans(2)
        .run(&scans)
        .await;

    assert_failed_at(&report, "subjectB", StageName::Extraction);
    assert_scan_status(&report, "subjectA", ScanStatus::Cancelled);
    // Cancellation lands while subjectA is still inside registration at the latest
    let ran = log.stages_for("subjectA");
    assert!(!ran.contains(&StageName::Normalization), "{ran:?}");
    assert!(!ws.paths().mask("subjectA").exists());

    let last = report.scan("subjectA").unwrap().stages.last().unwrap();
    assert_eq!(last.status, StageStatus::Cancel);
    assert!(last.error.as_deref().unwrap().contains("subjectB"));
}

#[tokio::test]
async fn test_external_cancellation_skips_everything() {
    let (_dir, ws, scans) = setup(&["subjectA", "subjectB"]);
    let log = CallLog::new();
    let token = Arc::new(CancellationToken::new());
    let orchestrator = Orchestrator::new(pipeline_of(mock_stages(&log)), ws.paths())
        .with_cancellation(token.clone());
    token.cancel("interrupted");

    let report = orchestrator.run(&scans).await;

    assert_eq!(report.totals.skipped, 2);
    assert!(log.is_empty());
    assert_eq!(report.cancel_reason.as_deref(), Some("interrupted"));
}

#[tokio::test]
async fn test_event_sequence_for_one_scan() {
    let (_dir, ws, scans) = setup(&["subjectA"]);
    let log = CallLog::new();
    let sink = Arc::new(CollectingEventSink::new());
    let orchestrator =
        Orchestrator::new(pipeline_of(mock_stages(&log)), ws.paths()).with_event_sink(sink.clone());

    orchestrator.run(&scans).await;

    let mut expected = vec![events::PIPELINE_STARTED, events::SCAN_STARTED];
    for _ in StageName::ALL {
        expected.push(events::STAGE_STARTED);
        expected.push(events::STAGE_COMPLETED);
    }
    expected.push(events::SCAN_COMPLETED);
    expected.push(events::PIPELINE_COMPLETED);
    assert_eq!(sink.event_types(), expected);

    let started = sink.events_of_type(events::PIPELINE_STARTED);
    let data = started[0].1.as_ref().unwrap();
    assert_eq!(data["host"], serde_json::json!(orchestrator.identity().host));
    assert_eq!(
        data["stages"],
        serde_json::json!(["extraction", "registration", "normalization", "segmentation"])
    );

    let run_id = orchestrator.identity().pipeline_run_id.to_string();
    for (_, data) in sink.events() {
        assert_eq!(data.unwrap()["pipeline_run_id"], run_id.as_str());
    }
}

#[tokio::test]
async fn test_completion_event_names_first_failure() {
    let (_dir, ws, scans) = setup(&["subjectA", "subjectB", "subjectC"]);
    let log = CallLog::new();
    let stages = stages_with(&log, StageName::Registration, |s| s.fail_for("subjectB"));
    let sink = Arc::new(CollectingEventSink::new());

    Orchestrator::new(pipeline_of(stages), ws.paths())
        .with_event_sink(sink.clone())
        .run(&scans)
        .await;

    let completed = sink.events_of_type(events::PIPELINE_COMPLETED);
    let first = &completed[0].1.as_ref().unwrap()["first_failure"];
    assert_eq!(first["subject_id"], "subjectB");
    assert_eq!(first["stage"], "registration");
}

#[tokio::test]
async fn test_rerun_produces_identical_masks() {
    let (_dir, ws, scans) = setup(&["subjectA", "subjectB"]);

    let mut digests = Vec::new();
    for _ in 0..2 {
        let log = CallLog::new();
        let report = Orchestrator::new(pipeline_of(mock_stages(&log)), ws.paths())
            .run(&scans)
            .await;
        digests.push(
            report
                .scans
                .iter()
                .map(|s| s.mask_sha256.clone().unwrap())
                .collect::<Vec<_>>(),
        );
    }
    assert_eq!(digests[0], digests[1]);
    assert_ne!(digests[0][0], digests[0][1]);
}

#[tokio::test]
async fn test_failed_rerun_removes_earlier_mask() {
    let (_dir, ws, scans) = setup(&["subjectA", "subjectB"]);
    let log = CallLog::new();
    let first = Orchestrator::new(pipeline_of(mock_stages(&log)), ws.paths())
        .run(&scans)
        .await;
    assert!(first.all_succeeded());
    assert_volume_exists(&ws.paths().mask("subjectB"));

    let log = CallLog::new();
    let stages = stages_with(&log, StageName::Extraction, |s| s.fail_for("subjectB"));
    let second = Orchestrator::new(pipeline_of(stages), ws.paths())
        .run(&scans)
        .await;

    assert_failed_at(&second, "subjectB", StageName::Extraction);
    assert!(!ws.paths().mask("subjectB").exists());
    assert!(second.scan("subjectB").unwrap().mask.is_none());
    assert_volume_exists(&ws.paths().mask("subjectA"));
}

#[tokio::test]
async fn test_cleanup_all_only_for_successful_scans() {
    let (_dir, ws, scans) = setup(&["subjectA", "subjectB"]);
    let log = CallLog::new();
    let stages = stages_with(&log, StageName::Segmentation, |s| s.fail_for("subjectB"));
    let paths = ws.paths();

    Orchestrator::new(pipeline_of(stages), paths.clone())
        .with_cleanup(CleanupPolicy::All)
        .run(&scans)
        .await;

    for stage in StageName::ALL {
        assert!(!paths.stage_dir("subjectA", stage).exists());
    }
    assert!(paths.output("subjectB", StageName::Normalization).exists());
    assert_volume_exists(&paths.mask("subjectA"));
}

#[tokio::test]
async fn test_concurrent_scans_keep_input_order_in_report() {
    let subjects = ["s01", "s02", "s03", "s04", "s05", "s06"];
    let (_dir, ws, scans) = setup(&subjects);
    let log = CallLog::new();
    let stages: Vec<MockStage> = mock_stages(&log)
        .into_iter()
        .map(|s| s.with_delay(Duration::from_millis(5)))
        .collect();

    let report = Orchestrator::new(pipeline_of(stages), ws.paths())
        .with_max_concurrent_scans(4)
        .run(&scans)
        .await;

    let order: Vec<&str> = report.scans.iter().map(|s| s.subject_id.as_str()).collect();
    assert_eq!(order, subjects.to_vec());
    assert_eq!(report.totals.succeeded, subjects.len());
    for subject in subjects {
        assert_eq!(
            std::fs::read(ws.paths().mask(subject)).unwrap(),
            expected_mask(subject)
        );
    }
}
