//! PIX keys: type classification and the per-account key map.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::checksum;

/// Kind of a PIX key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PixKeyType {
    Cpf,
    Phone,
    Email,
    Random,
}

impl PixKeyType {
    pub const ALL: [PixKeyType; 4] = [
        PixKeyType::Cpf,
        PixKeyType::Phone,
        PixKeyType::Email,
        PixKeyType::Random,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PixKeyType::Cpf => "CPF",
            PixKeyType::Phone => "PHONE",
            PixKeyType::Email => "EMAIL",
            PixKeyType::Random => "RANDOM",
        }
    }
}

impl fmt::Display for PixKeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unrecognized PIX key type '{0}'")]
pub struct UnknownKeyType(pub String);

impl FromStr for PixKeyType {
    type Err = UnknownKeyType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PixKeyType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownKeyType(s.to_string()))
    }
}

/// Lookup table of telephone area codes (two digit prefixes).
pub trait AreaCodes: Send + Sync {
    fn contains(&self, code: &str) -> bool;
}

/// The Brazilian DDD codes.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrazilianAreaCodes;

const BRAZILIAN_DDDS: [&str; 67] = [
    "11", "12", "13", "14", "15", "16", "17", "18", "19", // SP
    "21", "22", "24", // RJ
    "27", "28", // ES
    "31", "32", "33", "34", "35", "37", "38", // MG
    "41", "42", "43", "44", "45", "46", // PR
    "47", "48", "49", // SC
    "51", "53", "54", "55", // RS
    "61", // DF
    "62", "64", // GO
    "63", // TO
    "65", "66", // MT
    "67", // MS
    "68", // AC
    "69", // RO
    "71", "73", "74", "75", "77", // BA
    "79", // SE
    "81", "87", // PE
    "82", // AL
    "83", // PB
    "84", // RN
    "85", "88", // CE
    "86", "89", // PI
    "91", "93", "94", // PA
    "92", "97", // AM
    "95", // RR
    "96", // AP
    "98", "99", // MA
];

impl AreaCodes for BrazilianAreaCodes {
    fn contains(&self, code: &str) -> bool {
        BRAZILIAN_DDDS.contains(&code)
    }
}

/// Email domains accepted as `EMAIL` keys.
pub const EMAIL_DOMAINS: [&str; 4] = ["@hotmail.com", "@gmail.com", "@outlook.com", "@yahoo.com"];

/// Work out what kind of PIX key `key` is.
///
/// Only 11 digit strings are tried as CPF or mobile phone; anything that fails
/// both falls through to the email and random rules.
pub fn classify(key: &str, area_codes: &dyn AreaCodes) -> PixKeyType {
    if checksum::is_eleven_distinct_digits(key) {
        if checksum::validate_cpf(key) {
            return PixKeyType::Cpf;
        }
        // mobile numbers carry a leading 9 right after the area code
        if key.as_bytes()[2] == b'9' && area_codes.contains(&key[..2]) {
            return PixKeyType::Phone;
        }
    }

    if EMAIL_DOMAINS.iter().any(|domain| key.contains(domain)) {
        return PixKeyType::Email;
    }

    PixKeyType::Random
}

/// A key of this type is already registered on the account.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("PIX key of type {0} already exists")]
pub struct PixKeyConflict(pub PixKeyType);

/// The PIX keys of one account, at most one value per type.
///
/// Updates return a new value; the caller writes it back to the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PixKeys {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cpf_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    phone_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    random_key: Option<String>,
}

impl PixKeys {
    fn slot(&self, key_type: PixKeyType) -> &Option<String> {
        match key_type {
            PixKeyType::Cpf => &self.cpf_key,
            PixKeyType::Phone => &self.phone_key,
            PixKeyType::Email => &self.email_key,
            PixKeyType::Random => &self.random_key,
        }
    }

    fn slot_mut(&mut self, key_type: PixKeyType) -> &mut Option<String> {
        match key_type {
            PixKeyType::Cpf => &mut self.cpf_key,
            PixKeyType::Phone => &mut self.phone_key,
            PixKeyType::Email => &mut self.email_key,
            PixKeyType::Random => &mut self.random_key,
        }
    }

    pub fn get(&self, key_type: PixKeyType) -> Option<&str> {
        self.slot(key_type).as_deref()
    }

    /// Registered `(type, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (PixKeyType, &str)> + '_ {
        PixKeyType::ALL
            .into_iter()
            .filter_map(|t| self.get(t).map(|v| (t, v)))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Add a key. Replacing an existing key requires deleting it first.
    pub fn create(&self, key_type: PixKeyType, value: impl Into<String>) -> Result<PixKeys, PixKeyConflict> {
        if self.slot(key_type).is_some() {
            return Err(PixKeyConflict(key_type));
        }
        let mut next = self.clone();
        *next.slot_mut(key_type) = Some(value.into());
        Ok(next)
    }

    /// Remove a key if present.
    pub fn delete(&self, key_type: PixKeyType) -> PixKeys {
        let mut next = self.clone();
        *next.slot_mut(key_type) = None;
        next
    }
}
