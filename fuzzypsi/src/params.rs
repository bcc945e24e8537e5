// This file is part of `fuzzypsi`.
// See LICENSE for licensing information.

//! Parameters for the labeled-HE back-end.
//!
//! The JSON file format accepts exactly the fields below; anything else is
//! rejected. `PsiParams::for_set_size` derives a parameter set from the
//! sender set size alone, so both parties compute identical parameters
//! without negotiation.

use crate::Error;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableParams {
    pub hash_func_count: u32,
    pub table_size: u32,
    pub max_items_per_bin: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ItemParams {
    pub felts_per_item: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryParams {
    pub ps_low_degree: u32,
    pub query_powers: Vec<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SealParams {
    pub plain_modulus: u64,
    pub poly_modulus_degree: u32,
    pub coeff_modulus_bits: Vec<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PsiParams {
    pub table_params: TableParams,
    pub item_params: ItemParams,
    pub query_params: QueryParams,
    pub seal_params: SealParams,
}

impl PsiParams {
    /// Derive parameters from the sender set size. The plain modulus is
    /// bumped to the smallest prime ≡ 1 (mod 2n) at or above the table
    /// value, and the table size is the smallest bundle multiple at or
    /// above 1.05·|S|.
    pub fn for_set_size(sender_size: usize) -> PsiParams {
        let (poly_modulus_degree, coeff_modulus_bits, plain_modulus): (u32, Vec<u32>, u64) =
            if sender_size <= 1 << 14 {
                (4096, vec![40, 32, 32, 40], 40961)
            } else if sender_size <= 1 << 16 {
                (8192, vec![50, 35, 35, 50], 65537)
            } else if sender_size <= 1 << 18 {
                (16384, vec![50, 40, 40, 50], 114689)
            } else {
                (32768, vec![60, 50, 50, 60], 786433)
            };
        let plain_modulus = next_batching_prime(plain_modulus, poly_modulus_degree as u64);

        let mut felts_per_item = 8u32;
        let bits = 63 - plain_modulus.leading_zeros();
        // Keep the item bit count inside [80, 128] over the allowed felt
        // counts; parts are capped at 128/felts bits each.
        for candidate in [8u32, 4, 16, 32] {
            let per_felt = bits.min(128 / candidate);
            let item_bits = candidate * per_felt;
            if (80..=128).contains(&item_bits) {
                felts_per_item = candidate;
                break;
            }
        }

        let bundle_size = poly_modulus_degree / felts_per_item;
        let target = ((sender_size * 105 + 99) / 100).max(1) as u32;
        let table_size = target.div_ceil(bundle_size) * bundle_size;

        let max_items_per_bin = 20;
        PsiParams {
            table_params: TableParams {
                hash_func_count: 3,
                table_size,
                max_items_per_bin,
            },
            item_params: ItemParams { felts_per_item },
            query_params: QueryParams {
                ps_low_degree: 0,
                query_powers: (1..=max_items_per_bin).collect(),
            },
            seal_params: SealParams {
                plain_modulus,
                poly_modulus_degree,
                coeff_modulus_bits,
            },
        }
    }

    /// Bins per batched plaintext.
    pub fn bundle_size(&self) -> u32 {
        self.seal_params.poly_modulus_degree / self.item_params.felts_per_item
    }

    /// Number of plaintext bundles covering the table.
    pub fn num_bundles(&self) -> u32 {
        self.table_params.table_size / self.bundle_size()
    }

    /// ⌊log₂ q⌋ for the plain modulus q.
    pub fn plain_modulus_bits(&self) -> u32 {
        63 - self.seal_params.plain_modulus.leading_zeros()
    }

    /// Bits of the item carried per field element. Bounded by both the
    /// plain modulus and the 128-bit item width.
    pub fn bits_per_felt(&self) -> u32 {
        self.plain_modulus_bits()
            .min(128 / self.item_params.felts_per_item)
    }

    /// Total item bits carried by one encoded item.
    pub fn item_bit_count(&self) -> u32 {
        self.item_params.felts_per_item * self.bits_per_felt()
    }

    /// Check every validation predicate. Protocol code runs this before any
    /// network traffic.
    pub fn validate(&self) -> Result<(), Error> {
        let t = &self.table_params;
        let q = self.seal_params.plain_modulus;
        let n = self.seal_params.poly_modulus_degree;

        if !(2..=4).contains(&t.hash_func_count) {
            return Err(Error::ParameterInvalid(format!(
                "hash_func_count {} not in 2..=4",
                t.hash_func_count
            )));
        }
        if !(1..=4096).contains(&t.max_items_per_bin) {
            return Err(Error::ParameterInvalid(format!(
                "max_items_per_bin {} not in 1..=4096",
                t.max_items_per_bin
            )));
        }
        if ![4, 8, 16, 32].contains(&self.item_params.felts_per_item) {
            return Err(Error::ParameterInvalid(format!(
                "felts_per_item {} not one of 4, 8, 16, 32",
                self.item_params.felts_per_item
            )));
        }
        if ![2048, 4096, 8192, 16384, 32768].contains(&n) {
            return Err(Error::ParameterInvalid(format!(
                "poly_modulus_degree {} unsupported",
                n
            )));
        }
        let coeff = &self.seal_params.coeff_modulus_bits;
        if !(2..=6).contains(&coeff.len()) || coeff.iter().any(|&b| !(30..=60).contains(&b)) {
            return Err(Error::ParameterInvalid(
                "coeff_modulus_bits must be 2..=6 entries of 30..=60 bits".into(),
            ));
        }
        if !is_prime(q) {
            return Err(Error::ParameterInvalid(format!("{} is not prime", q)));
        }
        if q % (2 * n as u64) != 1 {
            return Err(Error::ParameterInvalid(format!(
                "plain modulus {} is not 1 mod 2n = {}",
                q,
                2 * n
            )));
        }
        let item_bits = self.item_bit_count();
        if !(80..=128).contains(&item_bits) {
            return Err(Error::ParameterInvalid(format!(
                "item bit count {} not in 80..=128",
                item_bits
            )));
        }
        if t.table_size == 0 || t.table_size % self.bundle_size() != 0 {
            return Err(Error::ParameterInvalid(format!(
                "table_size {} is not a positive multiple of the bundle size {}",
                t.table_size,
                self.bundle_size()
            )));
        }
        let powers = &self.query_params.query_powers;
        if powers.is_empty() || !powers.contains(&1) {
            return Err(Error::ParameterInvalid(
                "query_powers must be non-empty and contain 1".into(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for &p in powers {
            if p == 0 || p > 4096 {
                return Err(Error::ParameterInvalid(format!(
                    "query power {} out of range",
                    p
                )));
            }
            if !seen.insert(p) {
                return Err(Error::ParameterInvalid(format!("duplicate query power {}", p)));
            }
        }
        Ok(())
    }

    /// Parse and validate the JSON file format.
    pub fn from_json(s: &str) -> Result<PsiParams, Error> {
        let params: PsiParams = serde_json::from_str(s)
            .map_err(|e| Error::InvalidInput(format!("parameters file: {}", e)))?;
        params.validate()?;
        Ok(params)
    }

    /// Render as the JSON file format.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Internal(e.to_string()))
    }

    /// Grow the table by one bundle (capacity retry at DB build time).
    pub(crate) fn expand_table(&mut self) {
        self.table_params.table_size += self.bundle_size();
    }
}

/// Smallest prime ≡ 1 (mod 2n) at or above `start`.
fn next_batching_prime(start: u64, n: u64) -> u64 {
    let step = 2 * n;
    let mut candidate = if start % step == 1 {
        start
    } else {
        (start / step) * step + 1
    };
    if candidate < start {
        candidate += step;
    }
    while !is_prime(candidate) {
        candidate += step;
    }
    candidate
}

fn mulmod(a: u64, b: u64, m: u64) -> u64 {
    ((a as u128 * b as u128) % m as u128) as u64
}

fn powmod(mut base: u64, mut exp: u64, m: u64) -> u64 {
    let mut acc = 1u64;
    base %= m;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = mulmod(acc, base, m);
        }
        base = mulmod(base, base, m);
        exp >>= 1;
    }
    acc
}

/// Deterministic Miller-Rabin for u64.
pub(crate) fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    for p in [2u64, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37] {
        if n == p {
            return true;
        }
        if n % p == 0 {
            return false;
        }
    }
    let mut d = n - 1;
    let mut r = 0;
    while d % 2 == 0 {
        d /= 2;
        r += 1;
    }
    'witness: for a in [2u64, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37] {
        let mut x = powmod(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 0..r - 1 {
            x = mulmod(x, x, n);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_is_prime() {
        assert!(is_prime(2));
        assert!(is_prime(40961));
        assert!(is_prime(65537));
        assert!(is_prime(786433));
        assert!(!is_prime(40963 * 3));
        assert!(!is_prime(1));
        assert!(!is_prime(65536));
    }

    #[test]
    fn test_builder_small_row() {
        let p = PsiParams::for_set_size(1000);
        assert_eq!(p.seal_params.poly_modulus_degree, 4096);
        assert_eq!(p.seal_params.plain_modulus, 40961);
        assert_eq!(p.bundle_size(), 512);
        p.validate().unwrap();
        // 1.05 · 1000 rounded up to a bundle multiple.
        assert_eq!(p.table_params.table_size, 512 * 3);
    }

    #[test]
    fn test_builder_matches_known_medium_row() {
        // |S| = 40000 lands in the 2^16 row: n = 8192, q = 65537, and
        // 65537 ≡ 1 (mod 16384).
        let p = PsiParams::for_set_size(40000);
        assert_eq!(p.seal_params.poly_modulus_degree, 8192);
        assert_eq!(p.seal_params.plain_modulus, 65537);
        assert_eq!(p.seal_params.plain_modulus % 16384, 1);
        p.validate().unwrap();
    }

    #[test]
    fn test_builder_all_rows_validate() {
        for size in [100, 1 << 14, 1 << 15, 1 << 17, 1 << 19] {
            let p = PsiParams::for_set_size(size);
            p.validate().unwrap();
            assert_eq!(
                p.seal_params.plain_modulus % (2 * p.seal_params.poly_modulus_degree as u64),
                1
            );
            assert!(p.table_params.table_size as usize * 100 >= size * 105);
        }
    }

    #[test]
    fn test_batching_invariant_rejected() {
        let mut p = PsiParams::for_set_size(1000);
        p.seal_params.plain_modulus = 40963; // prime, but not 1 mod 8192
        assert!(matches!(p.validate(), Err(Error::ParameterInvalid(_))));
    }

    #[test]
    fn test_table_multiple_rejected() {
        let mut p = PsiParams::for_set_size(1000);
        p.table_params.table_size += 1;
        assert!(matches!(p.validate(), Err(Error::ParameterInvalid(_))));
    }

    #[test]
    fn test_powers_must_contain_one() {
        let mut p = PsiParams::for_set_size(1000);
        p.query_params.query_powers = vec![2, 4];
        assert!(matches!(p.validate(), Err(Error::ParameterInvalid(_))));
    }

    proptest! {
        #[test]
        fn prop_builder_always_validates(size in 0usize..2_000_000) {
            let p = PsiParams::for_set_size(size);
            prop_assert!(p.validate().is_ok());
        }
    }

    #[test]
    fn test_json_roundtrip_and_unknown_field() {
        let p = PsiParams::for_set_size(5000);
        let json = p.to_json().unwrap();
        let q = PsiParams::from_json(&json).unwrap();
        assert_eq!(p, q);

        let extra = json.replacen(
            "\"table_params\"",
            "\"surplus\": 1, \"table_params\"",
            1,
        );
        assert!(matches!(
            PsiParams::from_json(&extra),
            Err(Error::InvalidInput(_))
        ));
    }
}
