use bedrock::{AesHash, AesRng, Block};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::Rng;

fn bench_gf_mul(c: &mut Criterion) {
    c.bench_function("Block::gf_mul", |b| {
        let x = rand::random::<Block>();
        let y = rand::random::<Block>();
        b.iter(|| {
            let z = x.gf_mul(black_box(y));
            black_box(z)
        });
    });
}

fn bench_clmul(c: &mut Criterion) {
    c.bench_function("Block::clmul", |b| {
        let x = rand::random::<Block>();
        let y = rand::random::<Block>();
        b.iter(|| {
            let z = x.clmul(black_box(y));
            black_box(z)
        });
    });
}

fn bench_rand(c: &mut Criterion) {
    c.bench_function("AesRng::gen", |b| {
        let mut rng = AesRng::new();
        b.iter(|| {
            let block = rng.gen::<Block>();
            black_box(block)
        });
    });
}

fn bench_cr_hash(c: &mut Criterion) {
    c.bench_function("AesHash::cr_hash", |b| {
        let hash = AesHash::new(rand::random::<Block>());
        let x = rand::random::<Block>();
        b.iter(|| {
            let y = hash.cr_hash(black_box(x));
            black_box(y)
        });
    });
}

criterion_group!(benches, bench_gf_mul, bench_clmul, bench_rand, bench_cr_hash);
criterion_main!(benches);
