use criterion::{criterion_group, criterion_main, Criterion};
use pocketboy::test::{build_rom, build_test, TestOptions};

fn benchmark_cpu_clock(c: &mut Criterion) {
    let mut gb = build_test(TestOptions {
        ppu_enabled: Some(false),
        apu_enabled: Some(false),
        timer_enabled: Some(false),
    });
    gb.load_rom(&build_rom(&[0x18, 0xfe]), None).unwrap();
    gb.boot();

    c.bench_function("cpu_cycles", |b| {
        b.iter(|| {
            gb.run_for_cycles(1_000_000);
        })
    });
}

criterion_group!(benches, benchmark_cpu_clock);
criterion_main!(benches);
