//! Modulo-11 check digits for agency numbers, account numbers and CPF tax ids.
//!
//! Everything here is pure. The weights and clamping rules must never change:
//! numbers that were issued with them are stored elsewhere and still have to
//! validate.

/// Length of an agency body (without its check digit).
pub const AGENCY_BODY_LEN: usize = 4;

/// Allowed lengths of an account body (without its check digit).
pub const ACCOUNT_BODY_LEN: std::ops::RangeInclusive<usize> = 7..=11;

/// Length of a CPF base (without its two check digits).
pub const CPF_BASE_LEN: usize = 9;

/// Account weights by position from the left, i.e. `[2, 3, .., 11, 2]` laid
/// right to left over an 11 slot frame.
const ACCOUNT_WEIGHTS: [u32; 11] = [2, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2];

/// Parse a string made only of ASCII digits.
fn digits(s: &str) -> Option<Vec<u32>> {
    s.chars().map(|c| c.to_digit(10)).collect()
}

/// `11 - sum % 11`, with 10 and 11 folded to 0.
fn mod11_digit(sum: u32) -> u8 {
    let digit = 11 - sum % 11;
    if digit > 9 { 0 } else { digit as u8 }
}

/// CPF flavour: remainders 0 and 1 give 0.
fn cpf_digit(ds: &[u32]) -> u32 {
    let len = ds.len() as u32;
    let sum: u32 = ds
        .iter()
        .enumerate()
        .map(|(i, d)| d * (len + 1 - i as u32))
        .sum();
    match sum % 11 {
        m if m < 2 => 0,
        m => 11 - m,
    }
}

/// Check digit of a 4 digit agency body.
pub fn agency_digit(body: &str) -> Option<u8> {
    let ds = digits(body)?;
    if ds.len() != AGENCY_BODY_LEN {
        return None;
    }
    let sum = ds[3] + ds[2] * 2 + ds[1] * 3 + ds[0] * 4;
    Some(mod11_digit(sum))
}

/// Check digit of a 7 to 11 digit account body.
pub fn account_digit(body: &str) -> Option<u8> {
    let ds = digits(body)?;
    if !ACCOUNT_BODY_LEN.contains(&ds.len()) {
        return None;
    }
    let sum = ds.iter().zip(ACCOUNT_WEIGHTS).map(|(d, w)| d * w).sum();
    Some(mod11_digit(sum))
}

/// Both check digits of a 9 digit CPF base.
pub fn cpf_digits(base: &str) -> Option<[u8; 2]> {
    let mut ds = digits(base)?;
    if ds.len() != CPF_BASE_LEN {
        return None;
    }
    let first = cpf_digit(&ds);
    ds.push(first);
    let second = cpf_digit(&ds);
    Some([first as u8, second as u8])
}

pub fn with_agency_digit(body: &str) -> Option<String> {
    agency_digit(body).map(|d| format!("{body}{d}"))
}

pub fn with_account_digit(body: &str) -> Option<String> {
    account_digit(body).map(|d| format!("{body}{d}"))
}

pub fn with_cpf_digits(base: &str) -> Option<String> {
    cpf_digits(base).map(|[a, b]| format!("{base}{a}{b}"))
}

/// Split off the last `n` chars, only when every char is an ASCII digit.
fn split_check(s: &str, n: usize) -> Option<(&str, &str)> {
    if !s.bytes().all(|b| b.is_ascii_digit()) || s.len() < n {
        return None;
    }
    Some(s.split_at(s.len() - n))
}

/// A 5 digit agency number whose last digit matches its body.
pub fn validate_agency(agency: &str) -> bool {
    if agency.len() != AGENCY_BODY_LEN + 1 {
        return false;
    }
    match split_check(agency, 1) {
        Some((body, check)) => agency_digit(body).is_some_and(|d| check == d.to_string()),
        None => false,
    }
}

/// An 8 to 12 digit account number whose last digit matches its body.
pub fn validate_account(account: &str) -> bool {
    if account.len() < 8 || account.len() > 12 {
        return false;
    }
    match split_check(account, 1) {
        Some((body, check)) => account_digit(body).is_some_and(|d| check == d.to_string()),
        None => false,
    }
}

/// True when the string is 11 ASCII digits that are not all the same digit.
///
/// Sequences like `11111111111` pass the mod-11 arithmetic but are never issued.
pub fn is_eleven_distinct_digits(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 11
        && bytes.iter().all(u8::is_ascii_digit)
        && bytes.iter().any(|b| *b != bytes[0])
}

pub fn validate_cpf(cpf: &str) -> bool {
    if !is_eleven_distinct_digits(cpf) {
        return false;
    }
    let (base, check) = cpf.split_at(CPF_BASE_LEN);
    cpf_digits(base).is_some_and(|[a, b]| check == format!("{a}{b}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn agency_digit_known_values() {
        assert_eq!(agency_digit("5986"), Some(8));
        assert_eq!(agency_digit("9783"), Some(1));
        // 0*4 + 0*3 + 0*2 + 0*1 = 0, 11 - 0 = 11 -> 0
        assert_eq!(agency_digit("0000"), Some(0));
    }

    #[test]
    fn agency_digit_rejects_bad_body() {
        assert_eq!(agency_digit("598"), None);
        assert_eq!(agency_digit("59861"), None);
        assert_eq!(agency_digit("59a6"), None);
    }

    #[test]
    fn account_digit_known_values() {
        assert_eq!(account_digit("911311115"), Some(9));
        assert_eq!(account_digit("1284822968"), Some(7));
    }

    #[test]
    fn account_digit_rejects_bad_length() {
        assert_eq!(account_digit("123456"), None);
        assert_eq!(account_digit("123456789012"), None);
    }

    #[test]
    fn cpf_digits_known_value() {
        assert_eq!(cpf_digits("046170650"), Some([4, 0]));
        assert_eq!(with_cpf_digits("046170650").as_deref(), Some("04617065040"));
    }

    #[test]
    fn validate_known_identifiers() {
        assert!(validate_agency("59868"));
        assert!(validate_agency("97831"));
        assert!(validate_account("9113111159"));
        assert!(validate_account("12848229687"));
        assert!(validate_cpf("04617065040"));
    }

    #[test]
    fn validate_agency_rejects_wrong_length() {
        assert!(!validate_agency("5986"));
        assert!(!validate_agency("598680"));
        assert!(!validate_agency(""));
    }

    #[test]
    fn validate_account_rejects_wrong_length() {
        assert!(!validate_account("1234567"));
        assert!(!validate_account("1234567890123"));
    }

    #[test]
    fn validate_rejects_non_digits() {
        assert!(!validate_agency("5986a"));
        assert!(!validate_account("91131111-9"));
        assert!(!validate_cpf("0461706504a"));
        // multibyte input must not panic on split
        assert!(!validate_agency("ééé"));
    }

    #[test]
    fn validate_cpf_rejects_repeated_digits() {
        assert!(!validate_cpf("11111111111"));
        assert!(!validate_cpf("00000000000"));
    }

    #[test]
    fn validate_cpf_rejects_wrong_length() {
        assert!(!validate_cpf("0461706504"));
        assert!(!validate_cpf("046170650400"));
    }

    #[test]
    fn validate_cpf_rejects_wrong_check_digits() {
        assert!(!validate_cpf("04617065041"));
        assert!(!validate_cpf("04617065030"));
    }

    fn other_digit(d: u8) -> impl Strategy<Value = u8> {
        (0u8..10).prop_filter("different digit", move |x| *x != d)
    }

    proptest! {
        #[test]
        fn agency_round_trip(body in "[0-9]{4}") {
            let agency = with_agency_digit(&body).unwrap();
            prop_assert!(validate_agency(&agency));
        }

        #[test]
        fn account_round_trip(body in "[0-9]{7,11}") {
            let account = with_account_digit(&body).unwrap();
            prop_assert_eq!(account.len(), body.len() + 1);
            prop_assert!(validate_account(&account));
        }

        #[test]
        fn cpf_round_trip(base in "[0-9]{9}") {
            let cpf = with_cpf_digits(&base).unwrap();
            prop_assume!(is_eleven_distinct_digits(&cpf));
            prop_assert!(validate_cpf(&cpf));
        }

        #[test]
        fn agency_detects_check_digit_change(
            (body, wrong) in "[0-9]{4}".prop_flat_map(|b| {
                let d = agency_digit(&b).unwrap();
                (Just(b), other_digit(d))
            })
        ) {
            let agency = format!("{body}{wrong}");
            prop_assert!(!validate_agency(&agency));
        }

        #[test]
        fn account_detects_check_digit_change(
            (body, wrong) in "[0-9]{7,11}".prop_flat_map(|b| {
                let d = account_digit(&b).unwrap();
                (Just(b), other_digit(d))
            })
        ) {
            let account = format!("{body}{wrong}");
            prop_assert!(!validate_account(&account));
        }

        #[test]
        fn cpf_detects_check_digit_change(
            (base, wrong) in "[0-9]{9}".prop_flat_map(|b| {
                let [first, _] = cpf_digits(&b).unwrap();
                (Just(b), other_digit(first))
            })
        ) {
            let [_, second] = cpf_digits(&base).unwrap();
            let cpf = format!("{base}{wrong}{second}");
            prop_assert!(!validate_cpf(&cpf));
        }
    }
}
