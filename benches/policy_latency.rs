use std::hint::black_box;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, SamplingMode};
use school_gate::bench_support::{bench_tenant, bench_users, GateBenchFixture};
use school_gate_policy::{PolicyEvaluator, Role, UserContext, FINANCE_MODULE, LIBRARY_MODULE};
use tokio::runtime::Runtime;

fn bench_policy_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("policy_eval");
    group
        .sample_size(500)
        .measurement_time(Duration::from_secs(5))
        .warm_up_time(Duration::from_secs(2))
        .sampling_mode(SamplingMode::Auto);

    let evaluator = PolicyEvaluator::builtin();
    let tenant = bench_tenant("harare-primary", &[FINANCE_MODULE, LIBRARY_MODULE]);

    let cases = [
        ("admin_users", "/admin/users", UserContext::new("admin", Role::SchoolAdmin).with_permissions(["users.manage"])),
        ("teacher_role_mismatch", "/admin/users", UserContext::new("teacher", Role::Teacher)),
        ("parent_payments", "/parent/payments/new", UserContext::new("parent", Role::Parent).with_permissions(["payments.make"])),
        ("student_home", "/student/timetable/week-3", UserContext::new("student", Role::Student)),
        ("default_allow", "/reports/summary", UserContext::new("student", Role::Student)),
    ];

    for (name, path, user) in cases {
        group.bench_function(BenchmarkId::new("evaluate", name), |b| {
            b.iter(|| black_box(evaluator.evaluate(black_box(path), &tenant, &user)));
        });
    }

    let gate_fixture = GateBenchFixture::new(bench_tenant("bulawayo-high", &[FINANCE_MODULE]));
    let runtime = Runtime::new().expect("tokio runtime");
    for user in bench_users() {
        let dashboard = user.role.default_dashboard();
        let headers = GateBenchFixture::headers_for(&user.user_id);
        let gate = gate_fixture.gate.clone();
        let host = gate_fixture.host.clone();
        group.bench_function(BenchmarkId::new("access_gate", user.role.as_str()), |b| {
            b.iter(|| black_box(runtime.block_on(gate.evaluate(&host, dashboard, &headers))));
        });
    }

    group.bench_function("concurrent_requests", |b| {
        let gate = gate_fixture.gate.clone();
        let host = gate_fixture.host.clone();
        b.to_async(&runtime).iter(|| async {
            let tasks = bench_users().into_iter().cycle().take(100).map(|user| {
                let gate = gate.clone();
                let host = host.clone();
                tokio::spawn(async move {
                    let headers = GateBenchFixture::headers_for(&user.user_id);
                    gate.evaluate(&host, user.role.default_dashboard(), &headers).await
                })
            });
            for task in tasks {
                task.await.expect("join handle");
            }
        });
    });

    group.finish();
}

criterion_group!(policy_latency, bench_policy_evaluation);
criterion_main!(policy_latency);
