//! Shamir Threshold Secret Sharing
//!
//! Splits an integer secret into `n` shares over the prime field of
//! [`crate::ca_field`] so that any `k` of them reconstruct it and fewer reveal
//! nothing.
//!
//! # Trust model
//! Shares are not verifiable. A corrupted or malicious share silently yields a
//! wrong secret instead of an error; only duplicate indices are detected.
//!
//! # Secret handling
//! [`SecretScalar`] keeps the secret bytes in a [`Zeroizing`] buffer that is
//! wiped on drop. This is best effort: big-integer temporaries created during
//! split/combine live outside that buffer and are not wiped.

use std::fmt;

use num_bigint::{BigUint, RandBigInt};
use rand::Rng;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::ca_field::{self, prime, ArithmeticError, FIELD_BYTES};

/// Errors from splitting, reconstructing or decoding shares
#[derive(Debug, Error)]
pub enum ShareError {
    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),

    /// Fewer than `k` shares were gathered (quorum failure at the call site)
    #[error("insufficient shares: need {needed}, got {got}")]
    InsufficientShares { needed: usize, got: usize },

    #[error("invalid sharing parameters: n={n}, k={k}")]
    InvalidParameters { n: usize, k: usize },

    #[error("secret is not a field element")]
    SecretOutOfRange,

    #[error("malformed share record: {0}")]
    MalformedRecord(String),
}

/// One point `(index, f(index))` of the sharing polynomial
#[derive(Clone, PartialEq, Eq)]
pub struct Share {
    pub index: u32,
    pub value: BigUint,
}

// Share values are secret material
impl fmt::Debug for Share {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Share")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// On-disk form of a share: `{"id": 3, "value": "<hex>"}`
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct ShareRecord {
    id: u32,
    value: String,
}

impl Share {
    /// Encode as a JSON share record
    pub fn to_record(&self) -> Vec<u8> {
        let record = ShareRecord {
            id: self.index,
            value: hex::encode(ca_field::to_fixed_bytes(&self.value)),
        };
        // Serializing a plain struct of a u32 and a String cannot fail
        serde_json::to_vec(&record).unwrap_or_default()
    }

    /// Decode a JSON share record
    pub fn from_record(bytes: &[u8]) -> Result<Self, ShareError> {
        let record: ShareRecord =
            serde_json::from_slice(bytes).map_err(|e| ShareError::MalformedRecord(e.to_string()))?;
        let raw = Zeroizing::new(
            hex::decode(&record.value).map_err(|e| ShareError::MalformedRecord(e.to_string()))?,
        );
        let value = BigUint::from_bytes_be(&raw);
        if &value >= prime() {
            return Err(ShareError::MalformedRecord("value outside field".into()));
        }
        Ok(Share {
            index: record.id,
            value,
        })
    }
}

/// Secret field element held in a self-wiping buffer
#[derive(Clone)]
pub struct SecretScalar(Zeroizing<Vec<u8>>);

impl SecretScalar {
    /// Wrap big-endian bytes; the caller's copy is not touched
    pub fn from_be_bytes(bytes: &[u8]) -> Self {
        SecretScalar(Zeroizing::new(bytes.to_vec()))
    }

    pub fn from_biguint(value: &BigUint) -> Self {
        SecretScalar(Zeroizing::new(ca_field::to_fixed_bytes(value).to_vec()))
    }

    pub fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_be(&self.0)
    }

    /// Fixed-width big-endian encoding
    pub fn to_fixed_bytes(&self) -> Zeroizing<[u8; FIELD_BYTES]> {
        Zeroizing::new(ca_field::to_fixed_bytes(&self.to_biguint()))
    }
}

impl fmt::Debug for SecretScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretScalar(..)")
    }
}

/// Evaluate a polynomial (constant term first) at `x` using Horner's method
fn eval_poly(coeffs: &[BigUint], x: u32) -> BigUint {
    let p = prime();
    let x = BigUint::from(x);
    coeffs
        .iter()
        .rev()
        .fold(BigUint::from(0u32), |acc, c| (acc * &x + c) % p)
}

/// Split `secret` into `n` shares, any `k` of which reconstruct it
///
/// The sharing polynomial has degree `k-1`, constant term `secret`, and
/// coefficients drawn uniformly from `[0, prime)` using `rng`.
pub fn split<R: Rng + ?Sized>(
    secret: &BigUint,
    n: usize,
    k: usize,
    rng: &mut R,
) -> Result<Vec<Share>, ShareError> {
    if k == 0 || k > n || n > u32::MAX as usize {
        return Err(ShareError::InvalidParameters { n, k });
    }
    if secret >= prime() {
        return Err(ShareError::SecretOutOfRange);
    }

    let mut coeffs = Vec::with_capacity(k);
    coeffs.push(secret.clone());
    for _ in 1..k {
        coeffs.push(rng.gen_biguint_below(prime()));
    }

    Ok((1..=n as u32)
        .map(|x| Share {
            index: x,
            value: eval_poly(&coeffs, x),
        })
        .collect())
}

/// Reconstruct the secret from shares by Lagrange interpolation at `x = 0`
///
/// No length check is made: handing in fewer than `k` shares interpolates a
/// lower-degree polynomial and returns a wrong value. Duplicate indices fail
/// with [`ArithmeticError`].
pub fn combine(shares: &[Share]) -> Result<BigUint, ArithmeticError> {
    let p = prime();
    let mut secret = BigUint::from(0u32);

    for (i, share_i) in shares.iter().enumerate() {
        let x_i = BigUint::from(share_i.index);
        let mut num = BigUint::from(1u32);
        let mut den = BigUint::from(1u32);

        for (j, share_j) in shares.iter().enumerate() {
            if i == j {
                continue;
            }
            let x_j = BigUint::from(share_j.index);
            // (0 - x_j) and (x_i - x_j), both mod p
            num = ca_field::mul_mod(&num, &ca_field::sub_mod(&BigUint::from(0u32), &x_j));
            den = ca_field::mul_mod(&den, &ca_field::sub_mod(&x_i, &x_j));
        }

        let basis = ca_field::mul_mod(&num, &ca_field::mod_inverse(&den)?);
        secret = (secret + ca_field::mul_mod(&share_i.value, &basis)) % p;
    }

    Ok(secret)
}

/// `k`-of-`n` parameters with a length-checked reconstruction path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdScheme {
    pub n: usize,
    pub k: usize,
}

impl ThresholdScheme {
    pub fn new(n: usize, k: usize) -> Result<Self, ShareError> {
        if k == 0 || k > n {
            return Err(ShareError::InvalidParameters { n, k });
        }
        Ok(Self { n, k })
    }

    pub fn split<R: Rng + ?Sized>(
        &self,
        secret: &SecretScalar,
        rng: &mut R,
    ) -> Result<Vec<Share>, ShareError> {
        split(&secret.to_biguint(), self.n, self.k, rng)
    }

    /// Reconstruct from at least `k` shares
    pub fn reconstruct(&self, shares: &[Share]) -> Result<SecretScalar, ShareError> {
        if shares.len() < self.k {
            return Err(ShareError::InsufficientShares {
                needed: self.k,
                got: shares.len(),
            });
        }
        let secret = combine(shares)?;
        Ok(SecretScalar::from_biguint(&secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    fn rng(seed: u8) -> StdRng {
        StdRng::from_seed([seed; 32])
    }

    #[test]
    fn test_split_produces_indexed_shares() {
        let mut rng = rng(1);
        let shares = split(&BigUint::from(42u32), 5, 3, &mut rng).unwrap();

        assert_eq!(shares.len(), 5);
        let indices: Vec<u32> = shares.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4, 5]);
        assert!(shares.iter().all(|s| &s.value < prime()));
    }

    #[test]
    fn test_every_k_subset_recovers_secret() {
        let mut rng = rng(2);
        let secret = rng.gen_biguint_below(prime());
        let shares = split(&secret, 5, 3, &mut rng).unwrap();

        for a in 0..5 {
            for b in (a + 1)..5 {
                for c in (b + 1)..5 {
                    let subset = [shares[a].clone(), shares[b].clone(), shares[c].clone()];
                    assert_eq!(combine(&subset).unwrap(), secret);
                }
            }
        }
    }

    #[test]
    fn test_more_than_k_shares_also_recover() {
        let mut rng = rng(3);
        let secret = BigUint::from(0xDEAD_BEEFu64);
        let shares = split(&secret, 6, 2, &mut rng).unwrap();
        assert_eq!(combine(&shares).unwrap(), secret);
    }

    #[test]
    fn test_boundary_secrets() {
        let mut rng = rng(4);
        let max = prime() - BigUint::from(1u32);
        for secret in [BigUint::from(0u32), BigUint::from(1u32), max] {
            let shares = split(&secret, 4, 4, &mut rng).unwrap();
            assert_eq!(combine(&shares).unwrap(), secret);
        }
    }

    #[test]
    fn test_insufficient_shares_do_not_recover() {
        let mut rng = rng(5);
        let mut recovered = 0;
        for _ in 0..200 {
            let secret = rng.gen_biguint_below(prime());
            let shares = split(&secret, 6, 3, &mut rng).unwrap();
            if combine(&shares[..2]).unwrap() == secret {
                recovered += 1;
            }
        }
        assert_eq!(recovered, 0);
    }

    #[test]
    fn test_duplicate_index_rejected() {
        let mut rng = rng(6);
        let shares = split(&BigUint::from(7u32), 4, 2, &mut rng).unwrap();
        let dup = [shares[1].clone(), shares[1].clone()];

        let err = combine(&dup).unwrap_err();
        assert!(matches!(err, ArithmeticError::NotInvertible { .. }));
    }

    #[test]
    fn test_invalid_parameters() {
        let mut rng = rng(7);
        let secret = BigUint::from(1u32);
        assert!(matches!(
            split(&secret, 3, 4, &mut rng),
            Err(ShareError::InvalidParameters { n: 3, k: 4 })
        ));
        assert!(matches!(
            split(&secret, 3, 0, &mut rng),
            Err(ShareError::InvalidParameters { .. })
        ));
        assert!(matches!(
            split(prime(), 3, 2, &mut rng),
            Err(ShareError::SecretOutOfRange)
        ));
        assert!(ThresholdScheme::new(2, 3).is_err());
    }

    #[test]
    fn test_scheme_rejects_short_share_set() {
        let mut rng = rng(8);
        let scheme = ThresholdScheme::new(5, 3).unwrap();
        let secret = SecretScalar::from_biguint(&BigUint::from(99u32));
        let shares = scheme.split(&secret, &mut rng).unwrap();

        match scheme.reconstruct(&shares[..2]) {
            Err(ShareError::InsufficientShares { needed, got }) => {
                assert_eq!(needed, 3);
                assert_eq!(got, 2);
            }
            other => panic!("expected InsufficientShares, got {:?}", other),
        }

        let back = scheme.reconstruct(&shares[2..]).unwrap();
        assert_eq!(back.to_biguint(), BigUint::from(99u32));
    }

    #[test]
    fn test_split_is_reproducible_with_seed() {
        let secret = BigUint::from(12345u32);
        let a = split(&secret, 4, 3, &mut rng(9)).unwrap();
        let b = split(&secret, 4, 3, &mut rng(9)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_share_record_format() {
        let share = Share {
            index: 3,
            value: BigUint::from(0xABCDu32),
        };
        let bytes = share.to_record();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["value"].as_str().unwrap().len(), 64);

        assert_eq!(Share::from_record(&bytes).unwrap(), share);
        assert!(Share::from_record(b"{\"id\":1}").is_err());
        assert!(Share::from_record(b"{\"id\":1,\"value\":\"zz\"}").is_err());
    }

    #[test]
    fn test_share_debug_hides_value() {
        let share = Share {
            index: 1,
            value: BigUint::from(0x1234_5678u32),
        };
        let text = format!("{:?}", share);
        assert!(text.contains("index: 1"));
        assert!(!text.contains("305419896"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_any_k_subset_recovers(
            limbs in proptest::collection::vec(any::<u32>(), 8),
            n in 2usize..8,
            k_offset in 0usize..6,
            seed in any::<[u8; 32]>(),
        ) {
            let k = 2 + k_offset % (n - 1);
            let secret = BigUint::new(limbs) % prime();
            let mut rng = StdRng::from_seed(seed);

            let mut shares = split(&secret, n, k, &mut rng).unwrap();
            shares.shuffle(&mut rng);

            prop_assert_eq!(combine(&shares[..k]).unwrap(), secret);
        }
    }
}
