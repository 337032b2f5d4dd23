//! New agency and account numbers, and random PIX key tokens.

use rand::Rng;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::ops::RangeInclusive;

use crate::checksum::{self, ACCOUNT_BODY_LEN, AGENCY_BODY_LEN};

/// Source of random decimal digits.
///
/// Production code uses [`OsDigits`]; tests script the exact digits they need.
pub trait DigitSource {
    /// A digit in `0..10`.
    fn digit(&mut self) -> u8;

    /// A length drawn from `range`.
    fn length(&mut self, range: RangeInclusive<usize>) -> usize;
}

/// Digits drawn from the operating system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsDigits;

impl DigitSource for OsDigits {
    fn digit(&mut self) -> u8 {
        OsRng.gen_range(0..10)
    }

    fn length(&mut self, range: RangeInclusive<usize>) -> usize {
        OsRng.gen_range(range)
    }
}

fn draw(src: &mut impl DigitSource, len: usize) -> String {
    (0..len)
        .map(|_| char::from(b'0' + src.digit() % 10))
        .collect()
}

/// A fresh 5 digit agency number.
pub fn generate_agency(src: &mut impl DigitSource) -> String {
    let body = draw(src, AGENCY_BODY_LEN);
    let digit = checksum::agency_digit(&body).unwrap_or_default();
    format!("{body}{digit}")
}

/// A fresh 8 to 12 digit account number.
pub fn generate_account(src: &mut impl DigitSource) -> String {
    let len = src
        .length(ACCOUNT_BODY_LEN)
        .clamp(*ACCOUNT_BODY_LEN.start(), *ACCOUNT_BODY_LEN.end());
    let body = draw(src, len);
    let digit = checksum::account_digit(&body).unwrap_or_default();
    format!("{body}{digit}")
}

/// Hex SHA-256 of `seed`, used as the value of a `RANDOM` PIX key.
pub fn random_pix_key(seed: &str) -> String {
    hex::encode(Sha256::digest(seed.as_bytes()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::checksum::{validate_account, validate_agency};

    /// Replays `digits` cyclically and always picks `len` for lengths.
    pub(crate) struct Scripted {
        digits: Vec<u8>,
        pos: usize,
        len: usize,
    }

    impl Scripted {
        pub(crate) fn new(digits: &str, len: usize) -> Self {
            Self {
                digits: digits.bytes().map(|b| b - b'0').collect(),
                pos: 0,
                len,
            }
        }
    }

    impl DigitSource for Scripted {
        fn digit(&mut self) -> u8 {
            let d = self.digits[self.pos % self.digits.len()];
            self.pos += 1;
            d
        }

        fn length(&mut self, _range: RangeInclusive<usize>) -> usize {
            self.len
        }
    }

    #[test]
    fn scripted_agency() {
        let mut src = Scripted::new("5986", 0);
        assert_eq!(generate_agency(&mut src), "59868");
    }

    #[test]
    fn scripted_account() {
        let mut src = Scripted::new("1284822968", 10);
        assert_eq!(generate_account(&mut src), "12848229687");
    }

    #[test]
    fn account_length_is_clamped() {
        let mut src = Scripted::new("1", 40);
        assert_eq!(generate_account(&mut src).len(), 12);
        let mut src = Scripted::new("1", 1);
        assert_eq!(generate_account(&mut src).len(), 8);
    }

    #[test]
    fn os_digits_generate_valid_identifiers() {
        let mut src = OsDigits;
        for _ in 0..200 {
            let agency = generate_agency(&mut src);
            assert_eq!(agency.len(), 5);
            assert!(validate_agency(&agency));

            let account = generate_account(&mut src);
            assert!((8..=12).contains(&account.len()), "{account}");
            assert!(validate_account(&account));
        }
    }

    #[test]
    fn random_pix_key_is_deterministic_hex() {
        let a = random_pix_key("owner-1");
        assert_eq!(a.len(), 64);
        assert!(a.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_eq!(a, random_pix_key("owner-1"));
        assert_ne!(a, random_pix_key("owner-2"));
    }

    #[test]
    fn random_pix_key_known_digest() {
        assert_eq!(
            random_pix_key("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
