use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

use authflow::authenticator::{BasicAuthenticator, BasicCredentials, TicketAuthenticator};
use authflow::bridge::CrossContextBridge;
use authflow::config::{BridgeSettings, ScopeConfig};
use authflow::directory::StaticDirectory;
use authflow::exchange::MemoryExchange;
use authflow::session::{SessionRegistry, SESSION_COOKIE};
use authflow::{Container, Orchestrator};

fn directory() -> Arc<StaticDirectory> {
    Arc::new(
        StaticDirectory::new()
            .with_user("bob", "builder", &["user"])
            .with_ticket("t-bob", "bob"),
    )
}

fn bench_passes(c: &mut Criterion) {
    let container = Container::new(BridgeSettings::default());
    let dir = directory();
    let d = dir.clone();
    container.catalog().register_authenticator("basic", move || Arc::new(BasicAuthenticator::new(d.clone(), "bench")));
    container.catalog().register_authenticator("ticket", move || Arc::new(TicketAuthenticator::new(dir.clone())));
    let basic = container.add_scope("/basic", ScopeConfig::with_authenticator("basic"));
    let ticket = container.add_scope("/ticket", ScopeConfig::with_authenticator("ticket"));
    let sessions = SessionRegistry::default();
    let header = BasicCredentials { username: "bob".into(), password: "builder".into() }.to_header();

    // one logged-in session for the steady-state case
    let mut ex = MemoryExchange::new("/basic/x", sessions.clone()).with_header("Authorization", &header);
    let _ = Orchestrator::new(basic.clone()).handle(&mut ex, true);
    let sid = ex.session_id().map(str::to_string).unwrap_or_default();

    let mut group = c.benchmark_group("orchestrator");
    group.throughput(Throughput::Elements(1));

    group.bench_function("anonymous_optional", |b| {
        let orch = Orchestrator::new(basic.clone());
        b.iter(|| {
            let mut ex = MemoryExchange::new("/basic/public", sessions.clone());
            criterion::black_box(orch.handle(&mut ex, false).ok());
        });
    });

    group.bench_function("basic_with_session", |b| {
        let orch = Orchestrator::new(basic.clone());
        b.iter(|| {
            let mut ex = MemoryExchange::new("/basic/x", sessions.clone())
                .with_cookie(SESSION_COOKIE, &sid)
                .with_header("Authorization", &header);
            criterion::black_box(orch.handle(&mut ex, true).ok());
        });
    });

    group.bench_function("ticket_stateless", |b| {
        let orch = Orchestrator::new(ticket.clone());
        b.iter(|| {
            let mut ex = MemoryExchange::new("/ticket/x?j_security_ticket=t-bob", SessionRegistry::default());
            criterion::black_box(orch.handle(&mut ex, true).ok());
        });
    });
    group.finish();
}

fn bench_bridge(c: &mut Criterion) {
    let mut group = c.benchmark_group("bridge");
    for &cap in &[1_000usize, 100_000usize] {
        group.bench_with_input(BenchmarkId::new("lookup_create", cap), &cap, |b, &cap| {
            let bridge = CrossContextBridge::new(BridgeSettings { capacity: cap, ..BridgeSettings::default() });
            let mut i = 0u64;
            b.iter(|| {
                i += 1;
                criterion::black_box(bridge.lookup(&format!("tok-{}", i % (cap as u64 * 2)), true));
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_passes, bench_bridge);
criterion_main!(benches);
