// This file is part of `fuzzypsi`.
// See LICENSE for licensing information.

//! Labeled-HE private set intersection: OPRF pre-hashing, a cuckoo-indexed
//! sender database packed into batched BFV plaintexts, and one homomorphic
//! query round-trip.
//!
//! The sender inserts every item at all of its candidate bins; the
//! receiver cuckoo-hashes each item into exactly one. A bin's items are
//! the roots of a per-slot-part polynomial, so the encrypted evaluation
//! decrypts to zero in all of an item's slot parts exactly when the item
//! is present. The exact-distance post-filter upstream absorbs the
//! mix-and-match slot collisions this packing admits.

use crate::{
    cuckoo::CuckooHash,
    frame::{self, Reader, Tag, Writer},
    oprf,
    params::PsiParams,
    poly::{poly_from_roots, powmod, split_parts, truncate_item},
    Error,
};
use bedrock::{AbstractChannel, Block, SemiHonest};
use fhe::bfv::{
    dot_product_scalar, BfvParameters, BfvParametersBuilder, Ciphertext, Encoding, Plaintext,
    RelinearizationKey, SecretKey,
};
use fhe_traits::{
    DeserializeParametrized, FheDecoder, FheDecrypter, FheEncoder, FheEncrypter,
    Serialize as FheSerialize,
};
use rand::{CryptoRng, Rng, RngCore};
use rayon::prelude::*;
use std::sync::Arc;

/// Bundle-sized table expansions to try before giving up on a sender set.
const MAX_TABLE_EXPANSIONS: usize = 8;

/// Adapts a `rand` 0.8 `RngCore`/`CryptoRng` to the `rand_core` 0.9 traits
/// that `fhe`'s APIs require, since the two crates pin incompatible major
/// versions of `rand_core`.
struct RngCompat<'a, R: ?Sized>(&'a mut R);

impl<'a, R: RngCore + ?Sized> rand_core09::RngCore for RngCompat<'a, R> {
    fn next_u32(&mut self) -> u32 {
        self.0.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.0.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.fill_bytes(dest)
    }
}

impl<'a, R: RngCore + CryptoRng + ?Sized> rand_core09::CryptoRng for RngCompat<'a, R> {}

fn build_bfv(params: &PsiParams) -> Result<Arc<BfvParameters>, Error> {
    let sizes: Vec<usize> = params
        .seal_params
        .coeff_modulus_bits
        .iter()
        .map(|&b| b as usize)
        .collect();
    BfvParametersBuilder::new()
        .set_degree(params.seal_params.poly_modulus_degree as usize)
        .set_plaintext_modulus(params.seal_params.plain_modulus)
        .set_moduli_sizes(&sizes)
        .build_arc()
        .map_err(|e| Error::ParameterInvalid(format!("BFV context rejected: {}", e)))
}

fn build_pool(workers: usize) -> Result<rayon::ThreadPool, Error> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|e| Error::Internal(format!("worker pool: {}", e)))
}

// Coefficient plaintexts, one per (bundle, degree) pair. Read-only once
// built; queries may be evaluated against it concurrently.
struct SenderDb {
    coeffs: Vec<Vec<Plaintext>>,
}

/// Private set intersection sender.
pub struct Sender {
    params: PsiParams,
    bfv: Arc<BfvParameters>,
    oprf: oprf::Sender,
    pool: rayon::ThreadPool,
    db: Option<SenderDb>,
}

impl Sender {
    /// Initialize the PSI sender with validated parameters and a fresh
    /// OPRF key.
    pub fn new<RNG: CryptoRng + Rng>(
        params: PsiParams,
        workers: usize,
        rng: &mut RNG,
    ) -> Result<Self, Error> {
        params.validate()?;
        let bfv = build_bfv(&params)?;
        Ok(Sender {
            params,
            bfv,
            oprf: oprf::Sender::new(rng),
            pool: build_pool(workers)?,
            db: None,
        })
    }

    /// The effective parameters. Table expansion during [`Sender::build_db`]
    /// is reflected here; the receiver must be constructed from these.
    pub fn params(&self) -> &PsiParams {
        &self.params
    }

    /// Construct the sender database from fingerprints. Bin overflow grows
    /// the table by one bundle and retries.
    pub fn build_db(&mut self, fps: &[Block]) -> Result<(), Error> {
        let felts = self.params.item_params.felts_per_item;
        let bpf = self.params.bits_per_felt();
        // Bins are derived from the truncated item so both sides agree.
        let items: Vec<(Block, Vec<u64>)> = self
            .oprf
            .evaluate(fps)
            .into_iter()
            .map(|it| {
                let t = truncate_item(u128::from(it), felts, bpf);
                (Block::from(t), split_parts(t, felts, bpf))
            })
            .collect();

        for _ in 0..MAX_TABLE_EXPANSIONS {
            let table_size = self.params.table_params.table_size as usize;
            match self.assign_bins(&items, table_size) {
                Some(bins) => {
                    self.db = Some(self.pack(&bins)?);
                    log::info!(
                        "sender DB: {} items over {} bins in {} bundles",
                        items.len(),
                        table_size,
                        self.params.num_bundles()
                    );
                    return Ok(());
                }
                None => {
                    log::debug!("bin overflow at table size {}, expanding", table_size);
                    self.params.expand_table();
                }
            }
        }
        Err(Error::CapacityExceeded {
            items: items.len(),
            table_size: self.params.table_params.table_size as usize,
        })
    }

    // Place each item's parts at all of its candidate bins, bounded by the
    // per-bin capacity.
    fn assign_bins(
        &self,
        items: &[(Block, Vec<u64>)],
        table_size: usize,
    ) -> Option<Vec<Vec<Vec<u64>>>> {
        let cap = self.params.table_params.max_items_per_bin as usize;
        let nhashes = self.params.table_params.hash_func_count as usize;
        let mut bins: Vec<Vec<Vec<u64>>> = vec![Vec::new(); table_size];
        for (entry, parts) in items {
            for pos in CuckooHash::positions(*entry, nhashes, table_size) {
                if bins[pos].len() == cap {
                    return None;
                }
                bins[pos].push(parts.clone());
            }
        }
        Some(bins)
    }

    fn pack(&self, bins: &[Vec<Vec<u64>>]) -> Result<SenderDb, Error> {
        let q = self.params.seal_params.plain_modulus;
        let n = self.params.seal_params.poly_modulus_degree as usize;
        let felts = self.params.item_params.felts_per_item as usize;
        let degree = self.params.table_params.max_items_per_bin as usize;
        let bundle_size = self.params.bundle_size() as usize;
        let num_bundles = self.params.num_bundles() as usize;
        let bfv = &self.bfv;

        let coeffs = self.pool.install(|| {
            (0..num_bundles)
                .into_par_iter()
                .map(|g| {
                    let mut slots = vec![vec![0u64; n]; degree + 1];
                    for lb in 0..bundle_size {
                        let bin = &bins[g * bundle_size + lb];
                        for f in 0..felts {
                            let mut roots: Vec<u64> =
                                bin.iter().map(|parts| parts[f]).collect();
                            // The pad root q-1 exceeds every valid part.
                            roots.resize(degree, q - 1);
                            let c = poly_from_roots(&roots, q);
                            for (j, &cj) in c.iter().enumerate() {
                                slots[j][lb * felts + f] = cj;
                            }
                        }
                    }
                    slots
                        .iter()
                        .map(|v| {
                            Plaintext::try_encode(&v[..], Encoding::simd(), bfv).map_err(|e| {
                                Error::Internal(format!("coefficient encoding: {}", e))
                            })
                        })
                        .collect::<Result<Vec<Plaintext>, Error>>()
                })
                .collect::<Result<Vec<Vec<Plaintext>>, Error>>()
        })?;
        Ok(SenderDb { coeffs })
    }

    /// Serve one query session: OPRF round, then the homomorphic query.
    pub fn run<C: AbstractChannel>(&mut self, channel: &mut C) -> Result<(), Error> {
        let db = self
            .db
            .as_ref()
            .ok_or_else(|| Error::Internal("sender database not built".into()))?;
        self.oprf.serve(channel)?;

        let payload = frame::expect(channel, Tag::QueryRequest)?;
        let mut r = Reader::new(&payload);
        let table_size = r.u32()?;
        if table_size != self.params.table_params.table_size {
            return Err(Error::ProtocolMismatch(format!(
                "query table size {} does not match sender table size {}",
                table_size, self.params.table_params.table_size
            )));
        }
        let num_bundles = r.u32()? as usize;
        if num_bundles != self.params.num_bundles() as usize {
            return Err(Error::ProtocolMismatch(format!(
                "query has {} bundles, sender expects {}",
                num_bundles,
                self.params.num_bundles()
            )));
        }
        let num_powers = r.u32()? as usize;
        let mut powers = Vec::with_capacity(num_powers);
        for _ in 0..num_powers {
            powers.push(r.u32()?);
        }
        let rk = if r.u8()? == 1 {
            let len = r.u32()? as usize;
            let bytes = r.take(len)?;
            Some(
                RelinearizationKey::from_bytes(bytes, &self.bfv)
                    .map_err(|e| Error::ProtocolMismatch(format!("relinearization key: {}", e)))?,
            )
        } else {
            None
        };
        let mut query: Vec<Vec<(u32, Ciphertext)>> = Vec::with_capacity(num_bundles);
        for _ in 0..num_bundles {
            let mut per_bundle = Vec::with_capacity(num_powers);
            for &p in &powers {
                let len = r.u32()? as usize;
                let bytes = r.take(len)?;
                let ct = Ciphertext::from_bytes(bytes, &self.bfv)
                    .map_err(|e| Error::ProtocolMismatch(format!("query ciphertext: {}", e)))?;
                per_bundle.push((p, ct));
            }
            query.push(per_bundle);
        }
        r.finish()?;
        log::info!(
            "labeled sender: evaluating {} bundles over {} powers",
            num_bundles,
            num_powers
        );

        let degree = self.params.table_params.max_items_per_bin as usize;
        let results = self.pool.install(|| {
            db.coeffs
                .par_iter()
                .zip(query.par_iter())
                .map(|(coeffs, given)| eval_bundle(coeffs, given, rk.as_ref(), degree))
                .collect::<Result<Vec<Ciphertext>, Error>>()
        })?;

        let mut header = Writer::new();
        header.u32(results.len() as u32);
        frame::send(channel, Tag::QueryResponseHeader, &header.into_payload())?;
        for (g, ct) in results.iter().enumerate() {
            let bytes = ct.to_bytes();
            let mut w = Writer::new();
            w.u32(g as u32);
            w.u32(bytes.len() as u32);
            w.bytes(&bytes);
            frame::send(channel, Tag::ResultPackage, &w.into_payload())?;
        }
        Ok(())
    }
}

// Evaluate one bundle: materialize all powers 1..=degree from the received
// ones, then fold the coefficient dot product.
fn eval_bundle(
    coeffs: &[Plaintext],
    given: &[(u32, Ciphertext)],
    rk: Option<&RelinearizationKey>,
    degree: usize,
) -> Result<Ciphertext, Error> {
    let mut powers: Vec<Option<Ciphertext>> = vec![None; degree + 1];
    for (p, ct) in given {
        let p = *p as usize;
        if p <= degree {
            powers[p] = Some(ct.clone());
        }
    }
    if powers[0].is_none() {
        return Err(Error::ProtocolMismatch("query omits power 0".into()));
    }
    if degree >= 1 && powers[1].is_none() {
        return Err(Error::ProtocolMismatch("query omits power 1".into()));
    }
    for j in 2..=degree {
        if powers[j].is_some() {
            continue;
        }
        let rk = rk.ok_or_else(|| {
            Error::ProtocolMismatch(
                "query powers are incomplete but no relinearization key was sent".into(),
            )
        })?;
        // Balanced split keeps the multiplicative depth logarithmic.
        let (a, b) = (j / 2, j - j / 2);
        let mut prod = {
            let ca = powers[a]
                .as_ref()
                .ok_or_else(|| Error::Internal("power completion out of order".into()))?;
            let cb = powers[b]
                .as_ref()
                .ok_or_else(|| Error::Internal("power completion out of order".into()))?;
            ca * cb
        };
        rk.relinearizes(&mut prod)
            .map_err(|e| Error::Internal(format!("relinearization: {}", e)))?;
        powers[j] = Some(prod);
    }

    let powers: Vec<Ciphertext> = powers
        .into_iter()
        .map(|p| p.ok_or_else(|| Error::Internal("power completion missed an exponent".into())))
        .collect::<Result<_, _>>()?;
    dot_product_scalar(powers.iter(), coeffs.iter())
        .map_err(|e| Error::Internal(format!("homomorphic evaluation: {}", e)))
}

/// Private set intersection receiver.
pub struct Receiver {
    params: PsiParams,
    bfv: Arc<BfvParameters>,
    sk: SecretKey,
}

impl Receiver {
    /// Initialize the PSI receiver with validated parameters and a fresh
    /// secret key.
    pub fn new<RNG: CryptoRng + RngCore>(params: PsiParams, rng: &mut RNG) -> Result<Self, Error> {
        params.validate()?;
        let bfv = build_bfv(&params)?;
        let sk = SecretKey::random(&bfv, &mut RngCompat(rng));
        Ok(Receiver { params, bfv, sk })
    }

    /// Run one query over `inputs` (distinct fingerprints), returning the
    /// sorted indices of inputs found in the sender's set.
    pub fn receive<C: AbstractChannel, RNG: CryptoRng + Rng>(
        &mut self,
        inputs: &[Block],
        channel: &mut C,
        rng: &mut RNG,
    ) -> Result<Vec<usize>, Error> {
        let q = self.params.seal_params.plain_modulus;
        let n = self.params.seal_params.poly_modulus_degree as usize;
        let felts = self.params.item_params.felts_per_item as usize;
        let bpf = self.params.bits_per_felt();
        let degree = self.params.table_params.max_items_per_bin as usize;
        let table_size = self.params.table_params.table_size as usize;
        let bundle_size = self.params.bundle_size() as usize;
        let num_bundles = self.params.num_bundles() as usize;

        let evaluated: Vec<Block> = oprf::receive(channel, inputs, rng)?
            .into_iter()
            .map(|it| Block::from(truncate_item(u128::from(it), felts as u32, bpf)))
            .collect();
        let tbl = CuckooHash::new(
            &evaluated,
            table_size,
            self.params.table_params.hash_func_count as usize,
        )?;

        let mut powers: Vec<u32> = vec![0];
        powers.extend(self.params.query_params.query_powers.iter().copied());
        powers.sort_unstable();
        powers.dedup();
        let covered = (1..=degree as u32).all(|j| powers.binary_search(&j).is_ok());
        let rk = if covered {
            None
        } else {
            Some(
                RelinearizationKey::new(&self.sk, &mut RngCompat(rng))
                    .map_err(|e| Error::Internal(format!("relinearization key: {}", e)))?,
            )
        };

        let mut w = Writer::new();
        w.u32(table_size as u32);
        w.u32(num_bundles as u32);
        w.u32(powers.len() as u32);
        for &p in &powers {
            w.u32(p);
        }
        match &rk {
            Some(rk) => {
                let bytes = rk.to_bytes();
                w.u8(1);
                w.u32(bytes.len() as u32);
                w.bytes(&bytes);
            }
            None => w.u8(0),
        }
        for g in 0..num_bundles {
            for &p in &powers {
                let mut slots = vec![0u64; n];
                if p == 0 {
                    slots.fill(1);
                } else {
                    for lb in 0..bundle_size {
                        if let Some(item) = &tbl.items[g * bundle_size + lb] {
                            let parts = split_parts(u128::from(item.entry), felts as u32, bpf);
                            for (f, &part) in parts.iter().enumerate() {
                                slots[lb * felts + f] = powmod(part, p as u64, q);
                            }
                        }
                    }
                }
                let pt = Plaintext::try_encode(&slots[..], Encoding::simd(), &self.bfv)
                    .map_err(|e| Error::Internal(format!("query encoding: {}", e)))?;
                let ct: Ciphertext = self
                    .sk
                    .try_encrypt(&pt, &mut RngCompat(rng))
                    .map_err(|e| Error::Internal(format!("query encryption: {}", e)))?;
                let bytes = ct.to_bytes();
                w.u32(bytes.len() as u32);
                w.bytes(&bytes);
            }
        }
        frame::send(channel, Tag::QueryRequest, &w.into_payload())?;
        log::info!(
            "labeled receiver: sent {} bundles over {} powers",
            num_bundles,
            powers.len()
        );

        let header = frame::expect(channel, Tag::QueryResponseHeader)?;
        let mut hr = Reader::new(&header);
        let package_count = hr.u32()? as usize;
        hr.finish()?;
        if package_count != num_bundles {
            return Err(Error::ProtocolMismatch(format!(
                "response announces {} packages for {} bundles",
                package_count, num_bundles
            )));
        }

        let mut decoded: Vec<Option<Vec<u64>>> = vec![None; num_bundles];
        for received in 0..package_count {
            let payload = match frame::expect(channel, Tag::ResultPackage) {
                Ok(p) => p,
                Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Err(Error::Truncated {
                        expected: package_count,
                        received,
                    });
                }
                Err(e) => return Err(e),
            };
            let mut r = Reader::new(&payload);
            let g = r.u32()? as usize;
            let len = r.u32()? as usize;
            let bytes = r.take(len)?;
            r.finish()?;
            if g >= num_bundles || decoded[g].is_some() {
                return Err(Error::ProtocolMismatch(format!(
                    "unexpected result package for bundle {}",
                    g
                )));
            }
            let ct = Ciphertext::from_bytes(bytes, &self.bfv)
                .map_err(|e| Error::ProtocolMismatch(format!("result ciphertext: {}", e)))?;
            let pt = self
                .sk
                .try_decrypt(&ct)
                .map_err(|e| Error::ProtocolMismatch(format!("result decryption: {}", e)))?;
            let vals = Vec::<u64>::try_decode(&pt, Encoding::simd())
                .map_err(|e| Error::ProtocolMismatch(format!("result decoding: {}", e)))?;
            if vals.len() < n {
                return Err(Error::ProtocolMismatch(
                    "result package has too few slots".into(),
                ));
            }
            decoded[g] = Some(vals);
        }

        let mut matched = Vec::new();
        for (bin, item) in tbl.items.iter().enumerate() {
            let Some(item) = item else { continue };
            let g = bin / bundle_size;
            let lb = bin % bundle_size;
            let Some(vals) = &decoded[g] else { continue };
            if (0..felts).all(|f| vals[lb * felts + f] == 0) {
                matched.push(item.input_index);
            }
        }
        matched.sort_unstable();
        log::info!(
            "labeled receiver: {} of {} inputs matched",
            matched.len(),
            inputs.len()
        );
        Ok(matched)
    }
}

impl SemiHonest for Sender {}
impl SemiHonest for Receiver {}

#[cfg(test)]
mod tests {
    use super::*;
    use bedrock::{unix_channel_pair, AesRng};
    use rand::SeedableRng;

    fn run(params: PsiParams, sender_set: Vec<Block>, receiver_set: Vec<Block>) -> Vec<usize> {
        let (mut c1, mut c2) = unix_channel_pair().unwrap();
        std::thread::scope(|s| {
            let mut rng = AesRng::new();
            let mut sender = Sender::new(params, 2, &mut rng).unwrap();
            sender.build_db(&sender_set).unwrap();
            let effective = sender.params().clone();
            let handle = s.spawn(move || {
                sender.run(&mut c1).unwrap();
            });
            let mut rng = AesRng::new();
            let mut receiver = Receiver::new(effective, &mut rng).unwrap();
            let matched = receiver.receive(&receiver_set, &mut c2, &mut rng).unwrap();
            handle.join().unwrap();
            matched
        })
    }

    fn planted_sets(
        nsender: usize,
        nreceiver: usize,
        noverlap: usize,
    ) -> (Vec<Block>, Vec<Block>, Vec<usize>) {
        let mut rng = AesRng::seed_from_u64(99);
        let common: Vec<Block> = (0..noverlap).map(|_| rng.gen()).collect();
        let mut sender_set: Vec<Block> = (0..nsender - noverlap).map(|_| rng.gen()).collect();
        sender_set.extend(common.iter().copied());
        let mut receiver_set: Vec<Block> = (0..nreceiver - noverlap).map(|_| rng.gen()).collect();
        let first_planted = receiver_set.len();
        receiver_set.extend(common.iter().copied());
        let expected: Vec<usize> = (first_planted..first_planted + noverlap).collect();
        (sender_set, receiver_set, expected)
    }

    #[test]
    fn test_labeled_psi_small() {
        let (sender_set, receiver_set, expected) = planted_sets(300, 40, 12);
        let params = PsiParams::for_set_size(sender_set.len());
        let matched = run(params, sender_set, receiver_set);
        assert_eq!(matched, expected);
    }

    #[test]
    fn test_labeled_psi_sparse_powers_completion() {
        let (sender_set, receiver_set, expected) = planted_sets(200, 30, 7);
        let mut params = PsiParams::for_set_size(sender_set.len());
        params.table_params.max_items_per_bin = 8;
        params.query_params.query_powers = vec![1, 2, 4];
        params.validate().unwrap();
        let matched = run(params, sender_set, receiver_set);
        assert_eq!(matched, expected);
    }

    #[test]
    fn test_labeled_psi_no_overlap() {
        let (sender_set, receiver_set, _) = planted_sets(200, 30, 0);
        let params = PsiParams::for_set_size(sender_set.len());
        let matched = run(params, sender_set, receiver_set);
        assert!(matched.is_empty());
    }
}
