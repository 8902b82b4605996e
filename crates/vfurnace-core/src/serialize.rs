//! Binary encoding of machine records.
//!
//! Each persisted machine is a `bitcode` blob: a small [`RecordHeader`] and
//! the encoded [`MachineState`] payload. The header is checked before the
//! payload is decoded, so records written by a newer build are reported as
//! [`DecodeError::FutureVersion`] instead of as garbage.

use crate::id::MachineId;
use crate::machine::{InvalidState, MachineState};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying a machine record.
pub const RECORD_MAGIC: u32 = 0x5646_0001;

/// Current record format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
}

/// Why a stored record could not be turned back into a machine.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", RECORD_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("record from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
    #[error("record is keyed {key} but holds machine {stored}")]
    IdMismatch { key: MachineId, stored: MachineId },
    #[error("record failed validation: {0}")]
    Invalid(#[from] InvalidState),
}

// ---------------------------------------------------------------------------
// Record header
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordHeader {
    pub magic: u32,
    pub version: u32,
}

impl RecordHeader {
    pub fn current() -> Self {
        Self {
            magic: RECORD_MAGIC,
            version: FORMAT_VERSION,
        }
    }

    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.magic != RECORD_MAGIC {
            return Err(DecodeError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(DecodeError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(DecodeError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct MachineRecord {
    header: RecordHeader,
    payload: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Encode / decode
// ---------------------------------------------------------------------------

/// Encode one machine into a self-describing record.
pub fn encode_machine(state: &MachineState) -> Result<Vec<u8>, EncodeError> {
    let payload = bitcode::serialize(state).map_err(|e| EncodeError::Encode(e.to_string()))?;
    let record = MachineRecord {
        header: RecordHeader::current(),
        payload,
    };
    bitcode::serialize(&record).map_err(|e| EncodeError::Encode(e.to_string()))
}

/// Decode and validate one record.
pub fn decode_machine(data: &[u8]) -> Result<MachineState, DecodeError> {
    let record: MachineRecord =
        bitcode::deserialize(data).map_err(|e| DecodeError::Decode(e.to_string()))?;
    record.header.validate()?;
    let state: MachineState =
        bitcode::deserialize(&record.payload).map_err(|e| DecodeError::Decode(e.to_string()))?;
    state.validate()?;
    Ok(state)
}

/// Decode a record stored under `key`, rejecting records whose embedded id
/// disagrees with the key.
pub fn decode_keyed(key: MachineId, data: &[u8]) -> Result<MachineState, DecodeError> {
    let state = decode_machine(data)?;
    if state.id() != key {
        return Err(DecodeError::IdMismatch {
            key,
            stored: state.id(),
        });
    }
    Ok(state)
}
