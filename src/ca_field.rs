//! Prime Field Arithmetic
//!
//! Exact integer arithmetic modulo [`prime()`], the order of the NIST P-256
//! group. Every P-256 private scalar is therefore a valid field element, which
//! lets a root key be fed straight into the secret-sharing scheme.

use std::sync::OnceLock;

use num_bigint::{BigInt, BigUint};
use thiserror::Error;

/// P-256 group order, big-endian
const PRIME_BYTES: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xBC, 0xE6, 0xFA, 0xAD, 0xA7, 0x17, 0x9E, 0x84, 0xF3, 0xB9, 0xCA, 0xC2, 0xFC, 0x63, 0x25, 0x51,
];

/// Width of a field element in bytes
pub const FIELD_BYTES: usize = 32;

/// Errors from field arithmetic
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArithmeticError {
    /// gcd(k, modulus) != 1; in practice k ≡ 0, i.e. duplicate share indices
    #[error("modular inverse does not exist for {value} (gcd with modulus is {gcd})")]
    NotInvertible { value: BigUint, gcd: BigUint },
}

/// The field modulus
pub fn prime() -> &'static BigUint {
    static PRIME: OnceLock<BigUint> = OnceLock::new();
    PRIME.get_or_init(|| BigUint::from_bytes_be(&PRIME_BYTES))
}

/// Extended Euclidean algorithm for non-negative inputs
///
/// Returns `(g, x, y)` with `a*x + b*y == g == gcd(a, b)`.
pub fn extended_gcd(a: &BigInt, b: &BigInt) -> (BigInt, BigInt, BigInt) {
    let zero = BigInt::from(0);
    let (mut a, mut b) = (a.clone(), b.clone());
    let (mut x0, mut x1) = (BigInt::from(1), BigInt::from(0));
    let (mut y0, mut y1) = (BigInt::from(0), BigInt::from(1));

    while b != zero {
        let q = &a / &b;
        let r = &a % &b;
        a = std::mem::replace(&mut b, r);

        let x2 = &x0 - &q * &x1;
        x0 = std::mem::replace(&mut x1, x2);

        let y2 = &y0 - &q * &y1;
        y0 = std::mem::replace(&mut y1, y2);
    }

    (a, x0, y0)
}

/// Modular inverse of `k` under an arbitrary modulus
pub fn mod_inverse_with(k: &BigUint, modulus: &BigUint) -> Result<BigUint, ArithmeticError> {
    let k = k % modulus;
    let m = BigInt::from(modulus.clone());
    let (g, x, _) = extended_gcd(&BigInt::from(k.clone()), &m);

    if g != BigInt::from(1) {
        return Err(ArithmeticError::NotInvertible {
            value: k,
            gcd: g.magnitude().clone(),
        });
    }

    // x may be negative; bring it into [0, modulus)
    let x = ((x % &m) + &m) % &m;
    Ok(x.magnitude().clone())
}

/// Modular inverse of `k` modulo [`prime()`]
pub fn mod_inverse(k: &BigUint) -> Result<BigUint, ArithmeticError> {
    mod_inverse_with(k, prime())
}

/// `(a - b) mod p` for field elements
pub fn sub_mod(a: &BigUint, b: &BigUint) -> BigUint {
    let p = prime();
    ((a % p) + p - (b % p)) % p
}

/// `(a * b) mod p`
pub fn mul_mod(a: &BigUint, b: &BigUint) -> BigUint {
    (a * b) % prime()
}

/// Fixed-width big-endian encoding of a field element
pub fn to_fixed_bytes(value: &BigUint) -> [u8; FIELD_BYTES] {
    let raw = value.to_bytes_be();
    let mut out = [0u8; FIELD_BYTES];
    let start = FIELD_BYTES.saturating_sub(raw.len());
    let skip = raw.len().saturating_sub(FIELD_BYTES);
    out[start..].copy_from_slice(&raw[skip..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prime_is_p256_order() {
        let expected = BigUint::parse_bytes(
            b"FFFFFFFF00000000FFFFFFFFFFFFFFFFBCE6FAADA7179E84F3B9CAC2FC632551",
            16,
        )
        .unwrap();
        assert_eq!(prime(), &expected);
        assert_eq!(prime().bits(), 256);
    }

    #[test]
    fn test_extended_gcd_bezout() {
        let a = BigInt::from(240);
        let b = BigInt::from(46);
        let (g, x, y) = extended_gcd(&a, &b);

        assert_eq!(g, BigInt::from(2));
        assert_eq!(&a * &x + &b * &y, g);
    }

    #[test]
    fn test_mod_inverse_small_modulus() {
        let m = BigUint::from(17u32);
        for k in 1u32..17 {
            let inv = mod_inverse_with(&BigUint::from(k), &m).unwrap();
            assert_eq!((BigUint::from(k) * inv) % &m, BigUint::from(1u32));
        }
    }

    #[test]
    fn test_mod_inverse_prime_field() {
        let k = BigUint::from(123_456_789u64);
        let inv = mod_inverse(&k).unwrap();
        assert_eq!(mul_mod(&k, &inv), BigUint::from(1u32));

        // p - 1 is its own inverse
        let minus_one = prime() - BigUint::from(1u32);
        assert_eq!(mod_inverse(&minus_one).unwrap(), minus_one);
    }

    #[test]
    fn test_mod_inverse_of_zero_fails() {
        let err = mod_inverse(&BigUint::from(0u32)).unwrap_err();
        assert!(matches!(err, ArithmeticError::NotInvertible { .. }));

        // multiples of the modulus reduce to zero
        assert!(mod_inverse(prime()).is_err());
    }

    #[test]
    fn test_mod_inverse_non_coprime() {
        let m = BigUint::from(12u32);
        let err = mod_inverse_with(&BigUint::from(8u32), &m).unwrap_err();
        assert_eq!(
            err,
            ArithmeticError::NotInvertible {
                value: BigUint::from(8u32),
                gcd: BigUint::from(4u32),
            }
        );
    }

    #[test]
    fn test_sub_mod_wraps() {
        let a = BigUint::from(3u32);
        let b = BigUint::from(5u32);
        assert_eq!(sub_mod(&a, &b), prime() - BigUint::from(2u32));
        assert_eq!(sub_mod(&b, &a), BigUint::from(2u32));
    }

    #[test]
    fn test_fixed_bytes_pads() {
        let bytes = to_fixed_bytes(&BigUint::from(0x0102u32));
        assert_eq!(bytes[..30], [0u8; 30]);
        assert_eq!(bytes[30..], [0x01, 0x02]);
    }
}
