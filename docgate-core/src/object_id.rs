//! 12-byte object identifiers.
//!
//! Layout: 4-byte big-endian Unix timestamp, 5 bytes chosen at random once per process,
//! 3-byte big-endian counter. The counter starts at a random value and wraps at 2^24.

use std::{
    fmt,
    str::FromStr,
    sync::{
        LazyLock,
        atomic::{AtomicU32, Ordering},
    },
};

use chrono::Utc;
use rand::Rng;

use crate::error::{DecodeError, GatewayError, GatewayResult};

const COUNTER_MASK: u32 = 0x00ff_ffff;

static PROCESS_UNIQUE: LazyLock<[u8; 5]> = LazyLock::new(|| rand::random());

static COUNTER: LazyLock<AtomicU32> =
    LazyLock::new(|| AtomicU32::new(rand::thread_rng().gen_range(0..=COUNTER_MASK)));

/// A 12-byte identifier compared byte-lexicographically.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    /// Generates a new identifier for the current second.
    pub fn new() -> Self {
        let timestamp = Utc::now().timestamp() as u32;
        // 2^32 is a multiple of 2^24, so masking a wrapping u32 keeps the sequence continuous.
        let counter = COUNTER.fetch_add(1, Ordering::SeqCst) & COUNTER_MASK;

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&timestamp.to_be_bytes());
        bytes[4..9].copy_from_slice(&*PROCESS_UNIQUE);
        bytes[9..].copy_from_slice(&counter.to_be_bytes()[1..]);

        Self(bytes)
    }

    /// Wraps raw bytes without validation.
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    pub const fn bytes(&self) -> [u8; 12] {
        self.0
    }

    /// Returns the embedded Unix timestamp in seconds.
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// Returns the 24-character lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses the hex form, failing unless it decodes to exactly 12 bytes.
    pub fn parse_str(s: &str) -> GatewayResult<Self> {
        let decoded = hex::decode(s)
            .map_err(|e| DecodeError::Malformed(format!("invalid object id {s:?}: {e}")))?;
        let bytes: [u8; 12] = decoded
            .as_slice()
            .try_into()
            .map_err(|_| DecodeError::InvalidObjectId(decoded.len()))?;

        Ok(Self(bytes))
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for ObjectId {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl From<bson::oid::ObjectId> for ObjectId {
    fn from(oid: bson::oid::ObjectId) -> Self {
        Self(oid.bytes())
    }
}

impl From<ObjectId> for bson::oid::ObjectId {
    fn from(oid: ObjectId) -> Self {
        bson::oid::ObjectId::from_bytes(oid.0)
    }
}
