//! Write-ahead-log position codec.
//!
//! Positions travel as `HEX/HEX` text (`logid/recoff`) between nodes and in
//! the monitor table. [`Lsn`] parses that form, renders it back canonically,
//! and converts to an absolute byte offset for lag arithmetic.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Size of one WAL segment file in bytes.
pub const WAL_SEGMENT_BYTES: u64 = 16 * 1024 * 1024;

/// Segments per log id.
///
/// Kept at 255 so byte offsets line up with the values historical collectors
/// have already written into `repl_monitor`.
pub const WAL_SEGMENTS_PER_LOGID: u64 = 255;

/// A write-ahead-log position: `(logid, recoff)` pair, ordered
/// lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Lsn {
    logid: u32,
    recoff: u32,
}

impl Lsn {
    /// The `0/0` sentinel. A node publishing this is never a viable
    /// failover candidate.
    pub const ZERO: Lsn = Lsn {
        logid: 0,
        recoff: 0,
    };

    pub fn new(logid: u32, recoff: u32) -> Self {
        Self { logid, recoff }
    }

    pub fn logid(&self) -> u32 {
        self.logid
    }

    pub fn recoff(&self) -> u32 {
        self.recoff
    }

    /// Absolute byte offset of this position from the start of the log.
    pub fn to_bytes(&self) -> u64 {
        u64::from(self.logid) * WAL_SEGMENTS_PER_LOGID * WAL_SEGMENT_BYTES + u64::from(self.recoff)
    }

    /// Bytes by which `self` is ahead of `earlier`, clamped at zero when the
    /// reported positions run backwards.
    pub fn bytes_since(&self, earlier: Lsn) -> u64 {
        self.to_bytes().saturating_sub(earlier.to_bytes())
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}/{:X}", self.logid, self.recoff)
    }
}

/// Error returned when text does not match the `HEX/HEX` form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid log location {0:?}")]
pub struct LsnParseError(pub String);

impl FromStr for Lsn {
    type Err = LsnParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (logid, recoff) = s.split_once('/').ok_or_else(|| LsnParseError(s.into()))?;
        let logid = u32::from_str_radix(logid, 16).map_err(|_| LsnParseError(s.into()))?;
        let recoff = u32::from_str_radix(recoff, 16).map_err(|_| LsnParseError(s.into()))?;
        Ok(Lsn { logid, recoff })
    }
}
