//! Time-based one-time passcode registration, generation and verification.
//!
//! The [`authenticator::Authenticator`] is the entry point: it owns a
//! [`registry::SeedRegistry`] (user records behind a [`store::RecordStore`])
//! and an [`engine::OtpEngine`] deriving RFC 6238 codes from each user's seed.

pub mod authenticator;
pub mod clock;
pub mod config;
pub mod engine;
pub mod registry;
pub mod rpc;
pub mod store;
pub mod totp;
pub(crate) mod uri_helper;

use core::num;
use std::{fmt::Display, str::FromStr};

use hmac::{digest::KeyInit, Hmac, Mac};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Shortest accepted seed, in bytes (RFC 4226 section 4, R6).
pub const MIN_SEED_LEN: usize = 16;
/// Longest accepted seed, in bytes.
pub const MAX_SEED_LEN: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    #[error("The identifier {0} is already registered")]
    AlreadyRegistered(String),
    #[error("Unknown user: {0}")]
    UnknownUser(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Secret decode error")]
    SecretDecode(data_encoding::DecodeError),
    #[error("Invalid digest")]
    InvalidDigest(Vec<u8>),
    #[error("Invalid hashing algorithm, found {0}. Expected one of: SHA1, SHA256 or SHA512")]
    InvalidHashingAlgorithm(String),
    #[error("The provided URI is not from valid, found {0}. Expected: {1}")]
    InvalidUriType(String, String),
    #[error("Could not parse the URI")]
    UriParseError(url::ParseError),
    #[error("Could not retrieve the secret from the URI")]
    UriMissingSecret,
    #[error("Could not parse an integer. Failed parsing: {1}")]
    IntegerParseError(num::ParseIntError, String),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OtpHashAlgorithm {
    #[default]
    SHA1,
    SHA256,
    SHA512,
}

impl Display for OtpHashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SHA1 => write!(f, "SHA1"),
            Self::SHA256 => write!(f, "SHA256"),
            Self::SHA512 => write!(f, "SHA512"),
        }
    }
}

impl FromStr for OtpHashAlgorithm {
    type Err = OtpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_uppercase();

        match normalized.as_str() {
            "SHA1" => Ok(Self::SHA1),
            "SHA256" => Ok(Self::SHA256),
            "SHA512" => Ok(Self::SHA512),
            _ => Err(OtpError::InvalidHashingAlgorithm(s.to_string())),
        }
    }
}

/// A user's shared secret.
///
/// The bytes are wiped on drop and never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Seed(Vec<u8>);

impl Seed {
    /// Wraps raw seed bytes, rejecting lengths outside
    /// [`MIN_SEED_LEN`]..=[`MAX_SEED_LEN`].
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, OtpError> {
        let bytes = bytes.into();

        if !(MIN_SEED_LEN..=MAX_SEED_LEN).contains(&bytes.len()) {
            return Err(OtpError::InvalidInput(format!(
                "seed must be between {MIN_SEED_LEN} and {MAX_SEED_LEN} bytes, got {}",
                bytes.len()
            )));
        }

        Ok(Self(bytes))
    }

    /// Decodes an RFC4648 base32 seed. Padding, spaces and lowercase are tolerated.
    pub fn from_base32(encoded: &str) -> Result<Self, OtpError> {
        let normalized: String = encoded
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '=')
            .collect::<String>()
            .to_uppercase();

        let decoded = data_encoding::BASE32_NOPAD
            .decode(normalized.as_bytes())
            .map_err(OtpError::SecretDecode)?;

        Self::new(decoded)
    }

    pub fn to_base32(&self) -> String {
        data_encoding::BASE32_NOPAD.encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for Seed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Seed({} bytes, redacted)", self.0.len())
    }
}

impl Serialize for Seed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base32())
    }
}

impl<'de> Deserialize<'de> for Seed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_base32(&encoded).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OtpCode {
    code: u32,
    digits: u32,
}

impl OtpCode {
    pub fn integer(&self) -> u32 {
        self.code
    }

    /// Parses a submitted code, which must be exactly `digits` ASCII digits.
    pub fn parse(submitted: &str, digits: u32) -> Result<Self, OtpError> {
        if submitted.len() != digits as usize || !submitted.bytes().all(|b| b.is_ascii_digit()) {
            return Err(OtpError::InvalidInput(format!(
                "code must be exactly {digits} digits"
            )));
        }

        let code = u32::from_str(submitted)
            .map_err(|e| OtpError::IntegerParseError(e, "code".into()))?;

        Ok(Self { code, digits })
    }
}

impl Display for OtpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:0padding$}",
            self.code,
            padding = (self.digits as usize)
        )
    }
}

fn sign<M: Mac + KeyInit>(key: &[u8], data: &[u8]) -> Result<Vec<u8>, OtpError> {
    let mut mac = <M as Mac>::new_from_slice(key)
        .map_err(|_| OtpError::InvalidInput("HMAC key rejected".into()))?;
    mac.update(data);

    Ok(mac.finalize().into_bytes().to_vec())
}

pub trait Otp {
    fn secret(&self) -> &Seed;
    fn algorithm(&self) -> OtpHashAlgorithm;
    fn digits(&self) -> u32;

    /// Calculates the HMAC digest of the big-endian counter
    fn calc_digest(
        decoded_secret: &[u8],
        algorithm: OtpHashAlgorithm,
        data: u64,
    ) -> Result<Vec<u8>, OtpError> {
        let data = data.to_be_bytes();

        match algorithm {
            OtpHashAlgorithm::SHA1 => sign::<Hmac<Sha1>>(decoded_secret, &data),
            OtpHashAlgorithm::SHA256 => sign::<Hmac<Sha256>>(decoded_secret, &data),
            OtpHashAlgorithm::SHA512 => sign::<Hmac<Sha512>>(decoded_secret, &data),
        }
    }

    /// Encodes the HMAC digest into a truncated integer.
    fn encode_digest_truncated(digest: &[u8], target_digits_count: u32) -> Result<u32, OtpError> {
        // While sometimes this is a hardcoded 19
        // the last byte tells us the offset for any algorithm
        let offset = match digest.last() {
            Some(x) => *x & 0xf,
            None => return Err(OtpError::InvalidDigest(Vec::from(digest))),
        } as usize;

        // Gets the 4 bytes that will compose the code
        let code_bytes: [u8; 4] = match digest
            .get(offset..offset + 4)
            .and_then(|bytes| bytes.try_into().ok())
        {
            Some(x) => x,
            None => return Err(OtpError::InvalidDigest(Vec::from(digest))),
        };

        let code = u32::from_be_bytes(code_bytes);
        let truncation_factor = u32::pow(10, target_digits_count);

        Ok((code & 0x7fffffff) % truncation_factor)
    }

    /// Derives the code for a raw moving factor (the RFC 4226 counter).
    fn code_for_counter(&self, counter: u64) -> Result<OtpCode, OtpError> {
        let digest = Self::calc_digest(self.secret().as_bytes(), self.algorithm(), counter)?;
        let code = Self::encode_digest_truncated(digest.as_ref(), self.digits())?;

        Ok(OtpCode {
            code,
            digits: self.digits(),
        })
    }
}
