use criterion::{Criterion, criterion_group, criterion_main};
use std::collections::HashSet;
use std::hint::black_box;
use std::time::Duration;
use subtest_runner::config::{Capabilities, EnvMap};
use subtest_runner::core::classify::classify;
use subtest_runner::core::goodfile::GoodFileResolver;
use subtest_runner::core::planner::plan_matrix;
use subtest_runner::infra::command::{RunRequest, run};
use tokio::runtime::Runtime;

fn bench_plan_matrix(c: &mut Criterion) {
    let compile: Vec<String> = (0..8).map(|i| format!("--opt{i} # t.{i}.good")).collect();
    let exec: Vec<String> = (0..8).map(|i| format!("--n={i}")).collect();
    c.bench_function("plan_matrix_8x8", |b| {
        b.iter(|| plan_matrix(black_box(&compile), black_box(&exec)));
    });
}

fn bench_resolve_good_file(c: &mut Criterion) {
    let resolver = GoodFileResolver::new("host", "linux64", false, &Capabilities::default());
    let existing: HashSet<&str> = ["t.lm-flat.good", "t.good"].into_iter().collect();
    let suffixes = vec![".1".to_string(), String::new()];
    c.bench_function("resolve_good_file", |b| {
        b.iter(|| resolver.resolve_with(black_box("t"), &suffixes, |name| existing.contains(name)));
    });
}

fn bench_classify(c: &mut Criterion) {
    let output = "hello world\n".repeat(2000);
    c.bench_function("classify_clean_output", |b| {
        b.iter(|| classify(black_box(&output), ""));
    });
}

fn bench_run_child(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut req = RunRequest::new("/bin/sh", vec!["-c".to_string(), "echo bench".to_string()]);
    let mut env = EnvMap::new();
    env.insert("PATH".into(), std::env::var("PATH").unwrap_or_default());
    req.env = env;
    req.timeout = Duration::from_secs(10);

    c.bench_function("run_child_process", |b| {
        b.to_async(&rt).iter(|| async {
            let _ = run(&req).await;
        });
    });
}

criterion_group!(
    benches,
    bench_plan_matrix,
    bench_resolve_good_file,
    bench_classify,
    bench_run_child
);
criterion_main!(benches);
