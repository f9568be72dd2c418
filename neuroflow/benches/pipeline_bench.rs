//! Benchmarks for orchestration overhead with mock stages.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use neuroflow::core::{Scan, StagePaths};
use neuroflow::pipeline::{Orchestrator, PipelineBuilder};
use neuroflow::stages::Stage;
use neuroflow::testing::{mock_stages, CallLog, TestWorkspace};
use std::sync::Arc;
use tokio::runtime::Runtime;

fn setup(ws: &TestWorkspace, count: usize) -> Vec<Scan> {
    (0..count)
        .map(|i| {
            let subject = format!("sub-{i:03}");
            let path = ws
                .write_scan(&subject, format!("volume {i}").as_bytes())
                .unwrap();
            Scan::new(subject, path)
        })
        .collect()
}

fn orchestrator(paths: StagePaths, jobs: usize) -> Orchestrator {
    let log = CallLog::new();
    let pipeline = mock_stages(&log)
        .into_iter()
        .try_fold(PipelineBuilder::new(), |b, s| {
            b.stage(Arc::new(s) as Arc<dyn Stage>)
        })
        .and_then(PipelineBuilder::build)
        .unwrap();
    Orchestrator::new(pipeline, paths).with_max_concurrent_scans(jobs)
}

fn pipeline_benchmark(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let ws = TestWorkspace::create(dir.path()).unwrap();
    let scans = setup(&ws, 16);

    let mut group = c.benchmark_group("orchestrator");
    for jobs in [1, 4] {
        group.bench_with_input(BenchmarkId::new("16_scans", jobs), &jobs, |b, &jobs| {
            b.iter(|| {
                let report = rt.block_on(orchestrator(ws.paths(), jobs).run(&scans));
                black_box(report.totals)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, pipeline_benchmark);
criterion_main!(benches);
