use bedrock::{unix_channel_pair, AesRng, Block};
use fuzzypsi::{FastReceiver, FastSender};
use rand::Rng;
use std::time::SystemTime;

fn rand_block_vec(size: usize) -> Vec<Block> {
    let mut rng = AesRng::new();
    (0..size).map(|_| rng.gen()).collect()
}

fn main() {
    let n = 1 << 14;
    let overlap = 1 << 10;

    let mut sender_set = rand_block_vec(n - overlap);
    let mut receiver_set = rand_block_vec(n - overlap);
    let common = rand_block_vec(overlap);
    sender_set.extend(common.iter().copied());
    receiver_set.extend(common.iter().copied());

    let (mut c1, mut c2) = unix_channel_pair().unwrap();
    let total = SystemTime::now();
    let handle = std::thread::spawn(move || {
        let mut rng = AesRng::new();
        let start = SystemTime::now();
        FastSender::new()
            .send(&sender_set, &mut c1, &mut rng)
            .unwrap();
        println!(
            "[{}] Sender time: {} ms",
            n,
            start.elapsed().unwrap().as_millis()
        );
    });
    let mut rng = AesRng::new();
    let start = SystemTime::now();
    let matched = FastReceiver::new()
        .receive(&receiver_set, &mut c2, &mut rng)
        .unwrap();
    println!(
        "[{}] Receiver time: {} ms",
        n,
        start.elapsed().unwrap().as_millis()
    );
    handle.join().unwrap();
    println!(
        "Intersection size: {} (expected {})",
        matched.len(),
        overlap
    );
    println!("Total time: {} ms", total.elapsed().unwrap().as_millis());
}
