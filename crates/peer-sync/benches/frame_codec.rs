use bt_protocol::hex::HexPolicy;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use peer_sync::{GameStatus, SyncFrame, STATUS_FRAME_LEN};

fn status_frames(c: &mut Criterion) {
    let frame = SyncFrame::Status(GameStatus {
        p1_y: 40,
        p2_y: 72,
        ball_x: 64,
        ball_y: 12,
        score1: 2,
        score2: 1,
    });
    let wire = frame.encode();

    c.bench_function("status_encode", |b| b.iter(|| black_box(&frame).encode()));
    c.bench_function("status_decode_strict", |b| {
        b.iter(|| SyncFrame::decode(black_box(&wire[..STATUS_FRAME_LEN]), HexPolicy::Strict))
    });
    c.bench_function("status_decode_lenient", |b| {
        b.iter(|| SyncFrame::decode(black_box(&wire[..STATUS_FRAME_LEN]), HexPolicy::Lenient))
    });
}

criterion_group!(benches, status_frames);
criterion_main!(benches);
