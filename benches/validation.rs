use criterion::{criterion_group, criterion_main, Criterion};
use scangate::orchestrator::Orchestrator;
use scangate::registry::ToolRegistry;
use scangate::tools::{
    catalog, validate_arguments, validate_target, InvocationRequest, TargetPolicy,
    DEFAULT_MAX_ARGUMENT_LENGTH,
};
use std::hint::black_box;
use std::sync::Arc;

fn bench_validation(c: &mut Criterion) {
    c.bench_function("validate_target_ipv4", |b| {
        b.iter(|| validate_target(black_box("10.20.30.40")))
    });

    c.bench_function("validate_target_cidr", |b| {
        b.iter(|| validate_target(black_box("192.168.0.0/24")))
    });

    c.bench_function("validate_target_rejected", |b| {
        b.iter(|| validate_target(black_box("scanme.example.com")))
    });

    let nmap_flags: Vec<String> = catalog::nmap().allowed_flag_prefixes.unwrap_or_default();
    c.bench_function("validate_arguments_typical", |b| {
        b.iter(|| {
            validate_arguments(
                black_box("-sV -sC -T4 -p 22,80,443 --top-ports 1000 --open --reason"),
                Some(nmap_flags.as_slice()),
            )
        })
    });

    let long = "-p 1-65535 ".repeat(DEFAULT_MAX_ARGUMENT_LENGTH / 12);
    c.bench_function("validate_arguments_near_ceiling", |b| {
        b.iter(|| validate_arguments(black_box(&long), Some(nmap_flags.as_slice())))
    });

    let policy = TargetPolicy::default();
    let gobuster = catalog::gobuster();
    let request = InvocationRequest::new("10.0.0.5", "dir -w words.txt -t 20 -x php,html");
    c.bench_function("prepare_multi_mode", |b| {
        b.iter(|| gobuster.prepare(black_box(&request), &policy, DEFAULT_MAX_ARGUMENT_LENGTH))
    });

    // Validation failures never reach the runner, so this is the full
    // gateway overhead of a rejected call.
    let rt = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime for benchmark");
    let gateway = Orchestrator::new(
        Arc::new(ToolRegistry::builtin().expect("Failed to build tool registry")),
        Arc::new(scangate::tools::SandboxedExecutor::new()),
    );
    c.bench_function("execute_rejected_target", |b| {
        b.iter(|| {
            rt.block_on(gateway.execute("nmap", InvocationRequest::new("8.8.8.8", "-p 22")))
        })
    });
}

criterion_group!(benches, bench_validation);
criterion_main!(benches);
