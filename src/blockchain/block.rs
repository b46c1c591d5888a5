use std::io;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use super::payload::Payload;

/// `previous_hash` of the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = concat!(
    "0000000000000000",
    "0000000000000000",
    "0000000000000000",
    "0000000000000000",
);

/// Data stored in the genesis block
pub const GENESIS_DATA: &str = "Genesis Block";

/// Current time as fractional seconds since the Unix epoch
pub fn now_timestamp() -> f64 {
    let now = Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1_000_000.0
}

/// A candidate block whose nonce is still being searched for
///
/// The only way to obtain a [`Block`] is to seal one of these, either by
/// mining it or, for genesis, by hashing it directly.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsealedBlock {
    pub(super) index: u64,
    pub(super) timestamp: f64,
    pub(super) data: Payload,
    pub(super) previous_hash: String,
    pub(super) nonce: u64,
}

impl UnsealedBlock {
    /// Creates a candidate block with a nonce of zero
    ///
    /// # Arguments
    ///
    /// * `index` - The index the block will occupy in the chain
    /// * `timestamp` - Seconds since the Unix epoch
    /// * `data` - The payload to record
    /// * `previous_hash` - The hash of the block it extends
    pub fn new(index: u64, timestamp: f64, data: Payload, previous_hash: String) -> Self {
        UnsealedBlock {
            index,
            timestamp,
            data,
            previous_hash,
            nonce: 0,
        }
    }

    /// Creates the candidate for the first block of a chain
    pub fn genesis(timestamp: f64) -> Self {
        Self::new(
            0,
            timestamp,
            Payload::from(GENESIS_DATA),
            GENESIS_PREVIOUS_HASH.to_string(),
        )
    }

    /// Sets the nonce the mining search starts from
    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Calculates the hash of the candidate at its current nonce
    pub fn calculate_hash(&self) -> String {
        hash_fields(
            self.index,
            self.timestamp,
            &self.data,
            &self.previous_hash,
            self.nonce,
        )
    }

    /// Seals the block with the digest of its current fields
    ///
    /// No difficulty is enforced. Used for genesis, which is never mined.
    pub fn seal(self) -> Block {
        let hash = self.calculate_hash();
        self.seal_with(hash)
    }

    /// Seals the block with a digest the caller has already computed
    pub(super) fn seal_with(self, hash: String) -> Block {
        Block {
            index: self.index,
            timestamp: self.timestamp,
            data: self.data,
            previous_hash: self.previous_hash,
            nonce: self.nonce,
            hash,
        }
    }
}

/// Represents a sealed block in the chain
///
/// Fields are only readable. A block read back from storage is trusted as
/// written; [`Block::has_valid_hash`] and chain validation catch tampering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// Index of the block in the chain
    index: u64,

    /// Seconds since the Unix epoch when the block was created
    #[schema(example = 1700000000.25)]
    timestamp: f64,

    /// Payload recorded by the block
    #[schema(value_type = Object)]
    data: Payload,

    /// Hash of the previous block
    previous_hash: String,

    /// Proof of work
    nonce: u64,

    /// SHA-256 of the canonical encoding of the other fields
    hash: String,
}

impl Block {
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn data(&self) -> &Payload {
        &self.data
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Recomputes the hash from the stored fields
    ///
    /// # Returns
    ///
    /// The SHA-256 hash of the block as a lowercase hexadecimal string
    pub fn calculate_hash(&self) -> String {
        hash_fields(
            self.index,
            self.timestamp,
            &self.data,
            &self.previous_hash,
            self.nonce,
        )
    }

    /// Whether the stored hash matches the recomputed one
    pub fn has_valid_hash(&self) -> bool {
        self.hash == self.calculate_hash()
    }
}

/// The hashed fields, declared in sorted key order
#[derive(Serialize)]
struct HashInput<'a> {
    data: &'a Payload,
    index: u64,
    nonce: u64,
    previous_hash: &'a str,
    timestamp: f64,
}

fn hash_fields(index: u64, timestamp: f64, data: &Payload, previous_hash: &str, nonce: u64) -> String {
    let input = HashInput {
        data,
        index,
        nonce,
        previous_hash,
        timestamp,
    };

    let mut hasher = Sha256::new();
    hasher.update(canonical_encoding(&input));
    hex::encode(hasher.finalize())
}

/// Compact JSON with sorted keys, ASCII-only strings and fixed float layout
pub fn canonical_encoding<T: Serialize + ?Sized>(value: &T) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, CanonicalFormatter);
    // Writes into a Vec never fail, and hash inputs have only string keys
    value
        .serialize(&mut serializer)
        .expect("serializing hash input into memory cannot fail");
    buf
}

/// Compact JSON formatter that escapes anything outside printable ASCII
/// and lays floats out as shortest round-trip digits, positional for
/// decimal exponents in `[-4, 16)` and scientific otherwise.
struct CanonicalFormatter;

impl Formatter for CanonicalFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (pos, ch) in fragment.char_indices() {
            if (' '..='~').contains(&ch) {
                continue;
            }
            writer.write_all(fragment[start..pos].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{:04x}", unit)?;
            }
            start = pos + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }

    fn write_f64<W>(&mut self, writer: &mut W, value: f64) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(format_float(value).as_bytes())
    }
}

fn format_float(value: f64) -> String {
    let sign = if value.is_sign_negative() { "-" } else { "" };
    // `{:e}` yields the shortest digits that round-trip, e.g. "1.5e-5"
    let sci = format!("{:e}", value.abs());
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    if (-4..16).contains(&exponent) {
        if exponent >= 0 {
            let int_len = exponent as usize + 1;
            if digits.len() > int_len {
                format!("{sign}{}.{}", &digits[..int_len], &digits[int_len..])
            } else {
                format!("{sign}{digits}{}.0", "0".repeat(int_len - digits.len()))
            }
        } else {
            let zeros = "0".repeat((-exponent - 1) as usize);
            format!("{sign}0.{zeros}{digits}")
        }
    } else {
        let (lead, rest) = digits.split_at(1);
        let fraction = if rest.is_empty() {
            String::new()
        } else {
            format!(".{rest}")
        };
        let exp_sign = if exponent < 0 { '-' } else { '+' };
        format!("{sign}{lead}{fraction}e{exp_sign}{:02}", exponent.abs())
    }
}
