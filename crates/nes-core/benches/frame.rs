//! Frame throughput benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use nes_core::config::NesConfig;
use nes_core::system::NesSystem;

/// NROM image that enables rendering and the NMI, then spins.
fn rom() -> Vec<u8> {
    let mut image = vec![b'N', b'E', b'S', 0x1A, 1, 1, 0, 0];
    image.resize(16, 0);

    let mut prg = vec![0xEA; 0x4000];
    // LDA #$1E; STA $2001; LDA #$80; STA $2000; JMP $800A
    let program = [
        0xA9, 0x1E, 0x8D, 0x01, 0x20, 0xA9, 0x80, 0x8D, 0x00, 0x20, 0x4C, 0x0A, 0x80,
    ];
    prg[..program.len()].copy_from_slice(&program);
    // NMI handler: RTI
    prg[0x100] = 0x40;
    prg[0x3FFA..].copy_from_slice(&[0x00, 0x81, 0x00, 0x80, 0x00, 0x81]);
    image.extend_from_slice(&prg);

    let chr: Vec<u8> = (0..0x2000u32).map(|i| (i * 7) as u8).collect();
    image.extend_from_slice(&chr);
    image
}

fn bench_frame(c: &mut Criterion) {
    let mut system = NesSystem::from_ines(&rom(), NesConfig::default()).unwrap();
    c.bench_function("run_frame", |b| {
        b.iter(|| {
            system.run_frame().unwrap();
            black_box(system.frame_buffer()[0]);
        })
    });
}

fn bench_cpu_cycle(c: &mut Criterion) {
    let mut system = NesSystem::from_ines(&rom(), NesConfig::default()).unwrap();
    c.bench_function("tick", |b| b.iter(|| system.tick().unwrap()));
}

criterion_group!(benches, bench_frame, bench_cpu_cycle);
criterion_main!(benches);
