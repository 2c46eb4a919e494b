// APU Benchmarks
// Performance benchmarks for the sound render hot path

use apu_rs::{Apu, Machine, SampleMem, SNDCHIP_FDS, SNDCHIP_MMC5, SNDCHIP_N106, SNDCHIP_VRC6};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

struct FlatMem;

impl SampleMem for FlatMem {
    fn read_sample(&self, addr: u16) -> u8 {
        (addr >> 3) as u8
    }
}

const NTSC_FRAME: i32 = 29_829;

fn sounding_apu() -> Apu {
    let mut apu = Apu::new(Box::new(FlatMem));
    apu.setup_sound(44_100, 1, Machine::Ntsc).unwrap();

    // All five 2A03 channels running.
    apu.write(0x4015, 0x1F);
    apu.write(0x4000, 0xBF);
    apu.write(0x4002, 0xFD);
    apu.write(0x4003, 0x00);
    apu.write(0x4004, 0x7A);
    apu.write(0x4006, 0x54);
    apu.write(0x4007, 0x01);
    apu.write(0x4008, 0xFF);
    apu.write(0x400A, 0x7E);
    apu.write(0x400B, 0x08);
    apu.write(0x400C, 0x3F);
    apu.write(0x400E, 0x04);
    apu.write(0x400F, 0x10);
    apu.write(0x4010, 0x4F);
    apu.write(0x4013, 0x10);
    apu.write(0x4015, 0x1F);
    apu
}

/// Benchmark rendering one NTSC frame of the 2A03 alone
fn bench_2a03_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_frame");

    group.bench_function("2a03", |b| {
        let mut apu = sounding_apu();
        b.iter(|| {
            apu.add_cycles(black_box(NTSC_FRAME));
            apu.process();
        });
    });

    // Same frame with every delta-mixed expansion chip active.
    group.bench_function("2a03_with_expansions", |b| {
        let mut apu = sounding_apu();
        apu.set_external_sound(SNDCHIP_VRC6 | SNDCHIP_FDS | SNDCHIP_MMC5 | SNDCHIP_N106);
        apu.write(0x4015, 0x1F);
        apu.write(0x4000, 0xBF);
        apu.write(0x4002, 0xFD);
        apu.write(0x4003, 0x00);
        apu.external_write(0x9000, 0x8F);
        apu.external_write(0x9001, 0x40);
        apu.external_write(0x9002, 0x80);
        apu.external_write(0x5015, 0x03);
        apu.external_write(0x5000, 0xBF);
        apu.external_write(0x5002, 0x80);
        apu.external_write(0x5003, 0x08);
        b.iter(|| {
            apu.add_cycles(black_box(NTSC_FRAME));
            apu.process();
        });
    });

    group.finish();
}

/// Benchmark the register write path, which runs process() every time
fn bench_register_writes(c: &mut Criterion) {
    c.bench_function("register_write", |b| {
        let mut apu = sounding_apu();
        b.iter(|| {
            apu.add_cycles(black_box(100));
            apu.write(black_box(0x4002), black_box(0xFD));
        });
    });
}

criterion_group!(benches, bench_2a03_frame, bench_register_writes);
criterion_main!(benches);
