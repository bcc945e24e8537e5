// This file is part of `fuzzypsi`.
// See LICENSE for licensing information.

use crate::Error;
use bedrock::{Aes128, Block};

/// An entry in the cuckoo table.
#[derive(Clone, Debug)]
pub(crate) struct CuckooItem {
    // The actual value.
    pub(crate) entry: Block,
    // The input index associated with the entry.
    pub(crate) input_index: usize,
    // The hash index currently placing this entry.
    pub(crate) hash_index: usize,
}

/// A cuckoo table with `nhashes` hash functions and one item per bin. The
/// receiver mirrors the sender's table size, so `nbins` is a caller input
/// rather than derived from the item count.
pub(crate) struct CuckooHash {
    pub(crate) items: Vec<Option<CuckooItem>>,
    pub(crate) nbins: usize,
    pub(crate) nhashes: usize,
}

/// The number of times to loop when trying to place an entry in a bin.
const NITERS: usize = 1000;

impl CuckooHash {
    /// Build a new cuckoo hash table, hashing `inputs` in. Inputs are
    /// expected to be pseudorandom (OPRF outputs), so bins are derived from
    /// the raw entry bytes.
    pub fn new(inputs: &[Block], nbins: usize, nhashes: usize) -> Result<CuckooHash, Error> {
        let mut tbl = CuckooHash {
            items: vec![None; nbins],
            nbins,
            nhashes,
        };
        for (j, input) in inputs.iter().enumerate() {
            tbl.hash(*input, j)?;
        }
        Ok(tbl)
    }

    /// Place `input`, alongside the input index `idx` it corresponds to, in
    /// the hash table.
    pub fn hash(&mut self, input: Block, idx: usize) -> Result<(), Error> {
        let mut item = CuckooItem {
            entry: input,
            input_index: idx,
            hash_index: 0,
        };
        for _ in 0..NITERS {
            let i = CuckooHash::bin(item.entry, item.hash_index, self.nbins);
            let opt_item = self.items[i].replace(item);
            if let Some(x) = opt_item {
                // Keep iterating with the evicted item, bumping its hash
                // index.
                item = x;
                item.hash_index = (item.hash_index + 1) % self.nhashes;
            } else {
                return Ok(());
            }
        }
        Err(Error::CapacityExceeded {
            items: idx + 1,
            table_size: self.nbins,
        })
    }

    /// Output the bin number for a given hash output `hash` and hash index
    /// `hidx`.
    pub fn bin(hash: Block, hidx: usize, nbins: usize) -> usize {
        // The bytes of `hash` are uniformly(-ish) random, so the `hidx`th
        // 32-bit window determines the bin directly. Beyond three hash
        // functions, run the entry through AES keyed by itself.
        if hidx < 3 {
            let bytes = <[u8; 16]>::from(hash);
            let mut window = [0u8; 4];
            window.copy_from_slice(&bytes[4 * hidx..4 * (hidx + 1)]);
            (u32::from_le_bytes(window) as usize) % nbins
        } else {
            let aes = Aes128::new(hash);
            let h = aes.encrypt(Block::from(hidx as u128));
            (u128::from(h) % (nbins as u128)) as usize
        }
    }

    /// All candidate bins for `hash`, deduplicated in hash-index order.
    /// The sender inserts each item at every position, so equality with a
    /// receiver entry is positional no matter which hash function the
    /// receiver ended up using.
    pub fn positions(hash: Block, nhashes: usize, nbins: usize) -> Vec<usize> {
        let mut out = Vec::with_capacity(nhashes);
        for h in 0..nhashes {
            let b = CuckooHash::bin(hash, h, nbins);
            if !out.contains(&b) {
                out.push(b);
            }
        }
        out
    }
}

impl std::fmt::Debug for CuckooHash {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for i in 0..self.nbins {
            writeln!(f, "{}: {:?}", i, self.items[i])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bedrock::AesRng;
    use rand::Rng;

    const NHASHES: usize = 3;
    const SETSIZE: usize = 1 << 12;

    #[test]
    fn test_build() {
        let mut rng = AesRng::new();
        let inputs: Vec<Block> = (0..SETSIZE).map(|_| rng.gen()).collect();
        let nbins = SETSIZE * 2;
        let tbl = CuckooHash::new(&inputs, nbins, NHASHES);
        assert!(tbl.is_ok());
    }

    #[test]
    fn test_placement_consistent_with_positions() {
        let mut rng = AesRng::new();
        let inputs: Vec<Block> = (0..SETSIZE).map(|_| rng.gen()).collect();
        let nbins = SETSIZE * 2;
        let cuckoo = CuckooHash::new(&inputs, nbins, NHASHES).unwrap();

        let mut found = 0;
        for (bin, opt_item) in cuckoo.items.iter().enumerate() {
            if let Some(item) = opt_item {
                let positions = CuckooHash::positions(item.entry, NHASHES, nbins);
                assert!(positions.contains(&bin));
                assert_eq!(inputs[item.input_index], item.entry);
                found += 1;
            }
        }
        assert_eq!(found, SETSIZE);
    }

    #[test]
    fn test_overflow_reported() {
        let mut rng = AesRng::new();
        let inputs: Vec<Block> = (0..32).map(|_| rng.gen()).collect();
        let err = CuckooHash::new(&inputs, 4, NHASHES).unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded { .. }));
    }
}
