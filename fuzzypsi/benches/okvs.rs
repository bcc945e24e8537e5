use bedrock::{AesRng, Block};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fuzzypsi::okvs::{self, BandOkvs, DEFAULT_BAND_LENGTH};
use rand::Rng;

const N: usize = 1 << 12;

fn sample(n: usize, rng: &mut AesRng) -> (Vec<Block>, Vec<Block>) {
    let keys: Vec<Block> = (0..n).map(|_| rng.gen()).collect();
    let values: Vec<Block> = (0..n).map(|_| rng.gen()).collect();
    (keys, values)
}

fn bench_encode(c: &mut Criterion) {
    c.bench_function("BandOkvs::encode 2^12", |b| {
        let mut rng = AesRng::new();
        let (keys, values) = sample(N, &mut rng);
        let m = BandOkvs::okvs_size(N, DEFAULT_BAND_LENGTH);
        b.iter(|| {
            let out = okvs::encode(&keys, &values, m, DEFAULT_BAND_LENGTH, &mut rng).unwrap();
            black_box(out)
        });
    });
}

fn bench_decode(c: &mut Criterion) {
    c.bench_function("BandOkvs::decode", |b| {
        let mut rng = AesRng::new();
        let (keys, values) = sample(N, &mut rng);
        let m = BandOkvs::okvs_size(N, DEFAULT_BAND_LENGTH);
        let (okvs, p) = okvs::encode(&keys, &values, m, DEFAULT_BAND_LENGTH, &mut rng).unwrap();
        b.iter(|| black_box(okvs.decode(black_box(keys[7]), &p)));
    });
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
