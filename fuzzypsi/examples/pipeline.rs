use fuzzypsi::{pipeline, Backend, PipelineConfig};
use std::time::SystemTime;

fn main() {
    let delta = 50u64;
    let ds = ipsmith::synthesize(&ipsmith::SynthConfig {
        sender_size: 1 << 12,
        receiver_size: 1 << 10,
        delta: delta as u32,
        target_matches: 100,
        ..ipsmith::SynthConfig::default()
    })
    .unwrap();
    let senders: Vec<u128> = ds.senders.iter().map(|&x| x as u128).collect();
    let receivers: Vec<u128> = ds.receivers.iter().map(|&y| y as u128).collect();

    let cfg = PipelineConfig::new(delta, 32, Backend::OkvsVole);
    let start = SystemTime::now();
    let out = pipeline::run(&senders, &receivers, &cfg).unwrap();
    println!("Pipeline time: {} ms", start.elapsed().unwrap().as_millis());
    println!(
        "Matched receivers: {} (ground truth {})",
        out.matched_receivers.len(),
        ds.matched_receivers
    );
    assert_eq!(out.matched_receivers.len(), ds.matched_receivers);

    let mut expected: Vec<(u128, u128)> = ds
        .ground_truth
        .iter()
        .map(|&(x, y)| (x as u128, y as u128))
        .collect();
    expected.sort_unstable();
    assert_eq!(out.pairs, expected);
    println!("Pairs agree with ground truth: {}", out.pairs.len());
}
