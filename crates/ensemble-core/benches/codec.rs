//! Codec benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ensemble_core::{codec, ClientMessage, RoutingMode, StateSnapshot};

fn decode_benchmark(c: &mut Criterion) {
    let raw = br#"{"address":"/mouse/xy","args":[0.4213,0.7781]}"#;

    c.bench_function("decode_position_envelope", |b| {
        b.iter(|| black_box(codec::decode(black_box(raw)).unwrap()))
    });

    let raw = br#"{"type":"setMode","mode":"blended"}"#;

    c.bench_function("decode_set_mode", |b| {
        b.iter(|| black_box(codec::decode(black_box(raw)).unwrap()))
    });
}

fn encode_benchmark(c: &mut Criterion) {
    let msg = ClientMessage::State(StateSnapshot {
        user_id: 42,
        mode: RoutingMode::Zones,
        total_users: 16,
        zone: Some(7),
        is_active: true,
    });

    c.bench_function("encode_state_snapshot", |b| {
        b.iter(|| black_box(codec::encode(&msg).unwrap()))
    });
}

criterion_group!(benches, decode_benchmark, encode_benchmark);
criterion_main!(benches);
