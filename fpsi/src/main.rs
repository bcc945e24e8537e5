// This file is part of `fpsi`.
// See LICENSE for licensing information.

//! One subcommand per pipeline stage: dataset generation, prefix
//! encoding, in-process intersection, the two network roles, and
//! result verification.
//!
//! Exit codes: 0 on success, 1 on invariant violation, 2 on I/O failure,
//! 3 on protocol failure.

use clap::{Parser, Subcommand, ValueEnum};
use fuzzypsi::{
    files, pipeline, Backend, Error, Intersection, PipelineConfig, PsiParams, SessionConfig,
};
use std::{
    fs::File,
    io::{BufWriter, Write},
    net::{TcpListener, TcpStream},
    path::PathBuf,
    time::Duration,
};

#[derive(Parser)]
#[command(name = "fpsi", about = "Fuzzy private set intersection over numeric ids")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Role {
    Sender,
    Receiver,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a sender/receiver corpus with an exact match count.
    Gen {
        #[arg(long, default_value_t = 1024)]
        sender_size: usize,
        #[arg(long, default_value_t = 1024)]
        receiver_size: usize,
        #[arg(long, default_value_t = 50)]
        delta: u32,
        #[arg(long, default_value_t = 100)]
        target: usize,
        /// Require pairwise-disjoint receiver neighborhoods.
        #[arg(long)]
        disjoint: bool,
        /// Accept a partial dataset when the target cannot be met.
        #[arg(long)]
        allow_partial: bool,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long, default_value = "data")]
        out_dir: PathBuf,
    },
    /// Encode an id file into wildcard prefixes and a prefix map.
    Encode {
        #[arg(long)]
        ids: PathBuf,
        #[arg(long, value_enum)]
        role: Role,
        #[arg(long, default_value_t = 50)]
        delta: u64,
        #[arg(long, default_value_t = 32)]
        bits: u32,
        /// Output file for the deduplicated prefix strings.
        #[arg(long)]
        prefixes: PathBuf,
        /// Output file for the prefix -> id map.
        #[arg(long)]
        map: PathBuf,
    },
    /// Run the full pipeline in-process over two id files.
    Intersect {
        #[arg(long)]
        sender_ids: PathBuf,
        #[arg(long)]
        receiver_ids: PathBuf,
        #[arg(long, default_value_t = 50)]
        delta: u64,
        #[arg(long, default_value_t = 32)]
        bits: u32,
        #[arg(long, default_value = "vole")]
        backend: String,
        /// Labeled-HE parameters file (JSON).
        #[arg(long)]
        params: Option<PathBuf>,
        /// Optional `id -> label` map joined onto matched receivers.
        #[arg(long)]
        labels: Option<PathBuf>,
        #[arg(long, default_value_t = 8)]
        workers: usize,
        /// Result file for the matched receiver ids.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Serve the sender role of the PSI stage over TCP.
    Sender {
        #[arg(long)]
        listen: String,
        #[arg(long)]
        ids: PathBuf,
        #[arg(long, default_value_t = 50)]
        delta: u64,
        #[arg(long, default_value_t = 32)]
        bits: u32,
        #[arg(long, default_value = "vole")]
        backend: String,
        #[arg(long)]
        params: Option<PathBuf>,
        #[arg(long, default_value_t = 8)]
        workers: usize,
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },
    /// Run the receiver role of the PSI stage over TCP.
    Receiver {
        #[arg(long)]
        connect: String,
        #[arg(long)]
        ids: PathBuf,
        #[arg(long, default_value_t = 50)]
        delta: u64,
        #[arg(long, default_value_t = 32)]
        bits: u32,
        #[arg(long, default_value = "vole")]
        backend: String,
        #[arg(long)]
        params: Option<PathBuf>,
        #[arg(long, default_value_t = 8)]
        workers: usize,
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
        /// Result file for the candidate receiver ids.
        #[arg(long)]
        out: PathBuf,
    },
    /// Check a result file against the brute-force fuzzy intersection.
    Verify {
        #[arg(long)]
        sender_ids: PathBuf,
        #[arg(long)]
        receiver_ids: PathBuf,
        #[arg(long, default_value_t = 50)]
        delta: u64,
        #[arg(long)]
        result: PathBuf,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(e) = dispatch(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn make_config(
    delta: u64,
    bits: u32,
    backend: &str,
    params: &Option<PathBuf>,
    workers: usize,
    timeout_secs: u64,
) -> Result<PipelineConfig, Error> {
    let backend: Backend = backend.parse()?;
    let params = match params {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            Some(PsiParams::from_json(&text)?)
        }
        None => None,
    };
    Ok(PipelineConfig {
        delta,
        bits,
        backend,
        params,
        session: SessionConfig {
            workers,
            timeout: Duration::from_secs(timeout_secs),
        },
    })
}

// 32-bit ids are addresses; report them dotted-quad alongside the raw id.
fn render_id(id: u128, bits: u32) -> String {
    if bits == 32 {
        format!("{} ({})", id, files::ipv4_string(id as u32))
    } else {
        format!("{}", id)
    }
}

fn print_intersection(out: &Intersection, bits: u32) {
    println!("pairs: {}", out.pairs.len());
    println!("matched receivers: {}", out.matched_receivers.len());
    for &(x, y) in &out.pairs {
        println!("({}, {})", render_id(x, bits), render_id(y, bits));
    }
}

fn dispatch(command: Command) -> Result<(), Error> {
    match command {
        Command::Gen {
            sender_size,
            receiver_size,
            delta,
            target,
            disjoint,
            allow_partial,
            seed,
            out_dir,
        } => {
            let cfg = ipsmith::SynthConfig {
                sender_size,
                receiver_size,
                delta,
                target_matches: target,
                disjoint,
                allow_partial,
                seed,
                max_attempts: 1_000_000,
            };
            let ds = ipsmith::synthesize(&cfg).map_err(|e| match e {
                ipsmith::Error::InvalidConfig(s) => Error::InvalidInput(s),
                other => Error::Internal(other.to_string()),
            })?;
            std::fs::create_dir_all(&out_dir)?;
            let senders: Vec<u128> = ds.senders.iter().map(|&x| x as u128).collect();
            let receivers: Vec<u128> = ds.receivers.iter().map(|&y| y as u128).collect();
            files::write_ids(&out_dir.join("sender_ips.txt"), &senders)?;
            files::write_ids(&out_dir.join("receiver_ips.txt"), &receivers)?;
            let mut w = BufWriter::new(File::create(out_dir.join("ground_truth.txt"))?);
            writeln!(w, "# {} pairs within delta = {}", ds.ground_truth.len(), delta)?;
            for (x, y) in &ds.ground_truth {
                writeln!(w, "{} {}", x, y)?;
            }
            w.flush()?;
            println!(
                "wrote {} senders, {} receivers ({} matching) to {}",
                ds.senders.len(),
                ds.receivers.len(),
                ds.matched_receivers,
                out_dir.display()
            );
            Ok(())
        }
        Command::Encode {
            ids,
            role,
            delta,
            bits,
            prefixes,
            map,
        } => {
            let values = files::read_ids(&ids)?;
            let mut unique = Vec::new();
            let mut seen = std::collections::HashSet::new();
            let mut entries = Vec::new();
            for &v in &values {
                let ps = match role {
                    Role::Sender => prefixer::sender_prefixes(v, delta, bits),
                    Role::Receiver => prefixer::receiver_prefixes(v, delta, bits),
                };
                for p in ps {
                    entries.push((p.clone(), v));
                    if seen.insert(p.clone()) {
                        unique.push(p);
                    }
                }
            }
            let mut w = BufWriter::new(File::create(&prefixes)?);
            writeln!(w, "# {} unique prefixes", unique.len())?;
            for p in &unique {
                writeln!(w, "{}", p)?;
            }
            w.flush()?;
            files::write_prefix_map(&map, &entries)?;
            println!(
                "encoded {} ids into {} unique prefixes",
                values.len(),
                unique.len()
            );
            Ok(())
        }
        Command::Intersect {
            sender_ids,
            receiver_ids,
            delta,
            bits,
            backend,
            params,
            labels,
            workers,
            out,
        } => {
            let cfg = make_config(delta, bits, &backend, &params, workers, 30)?;
            let senders = files::read_ids(&sender_ids)?;
            let receivers = files::read_ids(&receiver_ids)?;
            let result = pipeline::run(&senders, &receivers, &cfg)?;
            print_intersection(&result, bits);
            if let Some(path) = labels {
                let labels = files::read_label_map(&path)?;
                for y in &result.matched_receivers {
                    if let Some(label) = labels.get(y) {
                        println!("{} -> {}", y, label);
                    }
                }
            }
            if let Some(path) = out {
                files::write_result_ids(&path, &result.matched_receivers)?;
            }
            Ok(())
        }
        Command::Sender {
            listen,
            ids,
            delta,
            bits,
            backend,
            params,
            workers,
            timeout_secs,
        } => {
            let cfg = make_config(delta, bits, &backend, &params, workers, timeout_secs)?;
            let values = files::read_ids(&ids)?;
            let listener = TcpListener::bind(&listen)?;
            log::info!("sender listening on {}", listen);
            let (stream, peer) = listener.accept()?;
            log::info!("session with {}", peer);
            let mut channel = bedrock::TcpChannel::new(stream, cfg.session.timeout)?;
            pipeline::run_sender(&values, &cfg, &mut channel)
        }
        Command::Receiver {
            connect,
            ids,
            delta,
            bits,
            backend,
            params,
            workers,
            timeout_secs,
            out,
        } => {
            let cfg = make_config(delta, bits, &backend, &params, workers, timeout_secs)?;
            let values = files::read_ids(&ids)?;
            let stream = TcpStream::connect(&connect)?;
            let mut channel = bedrock::TcpChannel::new(stream, cfg.session.timeout)?;
            let candidates = pipeline::run_receiver(&values, &cfg, &mut channel)?;
            files::write_result_ids(&out, &candidates)?;
            println!("{} candidate receivers written to {}", candidates.len(), out.display());
            Ok(())
        }
        Command::Verify {
            sender_ids,
            receiver_ids,
            delta,
            result,
        } => {
            let senders = files::read_ids(&sender_ids)?;
            let receivers = files::read_ids(&receiver_ids)?;
            let reported = files::read_result_ids(&result)?;
            let mut expected: Vec<u128> = receivers
                .iter()
                .copied()
                .filter(|&y| {
                    senders
                        .iter()
                        .any(|&x| x.abs_diff(y) <= delta as u128)
                })
                .collect();
            expected.sort_unstable();
            expected.dedup();
            let mut reported = reported;
            reported.sort_unstable();
            reported.dedup();
            println!("expected matching receivers: {}", expected.len());
            println!("reported matching receivers: {}", reported.len());
            if expected == reported {
                println!("verification passed");
                Ok(())
            } else {
                let missing = expected.iter().filter(|y| !reported.contains(y)).count();
                let surplus = reported.iter().filter(|y| !expected.contains(y)).count();
                Err(Error::Internal(format!(
                    "verification failed: {} missing, {} surplus receivers",
                    missing, surplus
                )))
            }
        }
    }
}
