//! Performance benchmarks for the hot paths of the shared state core

use client::replica::ReplicaController;
use server::presence::PresenceRegistry;
use server::store::StateStore;
use shared::{Action, Packet, SharedState};
use std::time::Instant;

/// Benchmarks the clamp rule applied by the authoritative store
#[test]
fn benchmark_store_apply() {
    let mut store = StateStore::new();

    let iterations = 1_000_000;
    let start = Instant::now();

    for i in 0..iterations {
        let _ = store.apply(Action::ALL[i % Action::ALL.len()]);
    }

    let duration = start.elapsed();
    println!(
        "Store apply: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    let state = store.snapshot();
    assert!(state.fill_level <= 100);
    assert!(state.temperature <= 100);

    // Should complete in under 2 seconds even in debug builds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks local simulation through the replica controller
#[test]
fn benchmark_local_simulation() {
    let mut replica = ReplicaController::new();

    let iterations = 1_000_000;
    let start = Instant::now();

    for i in 0..iterations {
        let action = if i % 3 == 1 { Action::Drain } else { Action::Fill };
        let _ = replica.dispatch(action);
    }

    let duration = start.elapsed();
    println!(
        "Local simulation: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert_eq!(replica.state().map(|s| s.fill_level), Some(100));
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks presence churn with many distinct identities
#[test]
fn benchmark_presence_churn() {
    let mut presence = PresenceRegistry::new();
    let identities: Vec<String> = (0..256).map(|i| format!("10.***.{}.***", i)).collect();

    let rounds = 1_000;
    let start = Instant::now();

    for _ in 0..rounds {
        for identity in &identities {
            presence.add(identity);
        }
        let snapshot = presence.snapshot();
        assert_eq!(snapshot.len(), identities.len());
        for identity in &identities {
            presence.remove(identity);
        }
    }

    let duration = start.elapsed();
    println!(
        "Presence churn: {} rounds of {} identities in {:?}",
        rounds,
        identities.len(),
        duration
    );

    assert_eq!(presence.count(), 0);
    assert!(duration.as_secs() < 10);
}

/// Benchmarks packet encoding for the broadcast path
#[test]
fn benchmark_update_serialization() {
    let packet = Packet::Update {
        state: SharedState::new(50, 50),
    };

    let iterations = 100_000;
    let start = Instant::now();

    let mut total_bytes = 0;
    for _ in 0..iterations {
        let data = bincode::serialize(&packet).unwrap();
        total_bytes += data.len();
    }

    let duration = start.elapsed();
    println!(
        "Update serialization: {} iterations in {:?} ({} bytes total)",
        iterations, duration, total_bytes
    );

    assert!(total_bytes > 0);
    assert!(duration.as_millis() < 2000);
}
