//! Commit record framing.
//!
//! Every committed write set is appended to the log as one record:
//!
//! ```text
//! | magic "SKVL" (4) | version u16 | payload len u32 | payload | crc32 u32 |
//!
//! payload = | sequence u64 | op count u32 | op* |
//! op      = | kind u8 | key len u32 | key | [value len u32 | value] |
//! ```
//!
//! All integers are little endian. The checksum covers header and payload.

use crate::error::{EngineError, EngineResult};

/// Magic bytes identifying a commit record.
pub const RECORD_MAGIC: [u8; 4] = *b"SKVL";

/// Current commit record format version.
pub const RECORD_VERSION: u16 = 1;

const HEADER_LEN: usize = 4 + 2 + 4;
const CRC_LEN: usize = 4;

const OP_PUT: u8 = 1;
const OP_DELETE: u8 = 2;

/// A single mutation inside a commit record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOp {
    /// Insert or overwrite a key.
    Put {
        /// Raw key bytes.
        key: Vec<u8>,
        /// Raw value bytes.
        value: Vec<u8>,
    },
    /// Remove a key.
    Delete {
        /// Raw key bytes.
        key: Vec<u8>,
    },
}

impl LogOp {
    /// Returns the key this operation touches.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        match self {
            Self::Put { key, .. } | Self::Delete { key } => key,
        }
    }
}

/// The atomic unit written to the commit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    /// Commit sequence assigned to this write set.
    pub sequence: u64,
    /// Mutations in application order.
    pub ops: Vec<LogOp>,
}

impl CommitRecord {
    /// Serializes the record including header and checksum.
    ///
    /// # Errors
    ///
    /// Returns an error if a key, value, or the payload exceeds `u32::MAX`
    /// bytes.
    pub fn encode(&self) -> EngineResult<Vec<u8>> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&self.sequence.to_le_bytes());
        payload.extend_from_slice(&len_u32(self.ops.len(), "op count")?.to_le_bytes());

        for op in &self.ops {
            match op {
                LogOp::Put { key, value } => {
                    payload.push(OP_PUT);
                    write_bytes(&mut payload, key, "key")?;
                    write_bytes(&mut payload, value, "value")?;
                }
                LogOp::Delete { key } => {
                    payload.push(OP_DELETE);
                    write_bytes(&mut payload, key, "key")?;
                }
            }
        }

        let mut out = Vec::with_capacity(HEADER_LEN + payload.len() + CRC_LEN);
        out.extend_from_slice(&RECORD_MAGIC);
        out.extend_from_slice(&RECORD_VERSION.to_le_bytes());
        out.extend_from_slice(&len_u32(payload.len(), "payload")?.to_le_bytes());
        out.extend_from_slice(&payload);
        let crc = compute_crc32(&out);
        out.extend_from_slice(&crc.to_le_bytes());
        Ok(out)
    }

    fn decode_payload(payload: &[u8], offset: u64) -> EngineResult<Self> {
        let mut cursor = Cursor {
            data: payload,
            pos: 0,
            offset,
        };

        let sequence = cursor.read_u64()?;
        let count = cursor.read_u32()?;
        let mut ops = Vec::new();

        for _ in 0..count {
            let kind = cursor.read_u8()?;
            let key = cursor.read_bytes()?;
            let op = match kind {
                OP_PUT => LogOp::Put {
                    key,
                    value: cursor.read_bytes()?,
                },
                OP_DELETE => LogOp::Delete { key },
                other => {
                    return Err(EngineError::corrupted(
                        offset,
                        format!("unknown op kind {other}"),
                    ))
                }
            };
            ops.push(op);
        }

        if cursor.pos != payload.len() {
            return Err(EngineError::corrupted(
                offset,
                format!(
                    "trailing bytes in commit record: expected {} bytes, got {}",
                    cursor.pos,
                    payload.len()
                ),
            ));
        }

        Ok(Self { sequence, ops })
    }
}

/// Result of scanning a commit log.
#[derive(Debug, Default)]
pub struct Replay {
    /// Records in log order.
    pub records: Vec<CommitRecord>,
    /// Length of the valid prefix. Anything after it is a torn tail.
    pub valid_len: u64,
}

impl Replay {
    /// Returns `true` if the log ends with an incomplete record.
    #[must_use]
    pub fn has_torn_tail(&self, total_len: u64) -> bool {
        self.valid_len < total_len
    }
}

/// Parses every complete record in `data`.
///
/// An incomplete trailing record, or a final record whose checksum does not
/// match, is treated as a torn write and excluded from `valid_len`. Damage
/// anywhere before the final record is reported as corruption.
///
/// # Errors
///
/// Returns [`EngineError::Corrupted`] for bad magic, unsupported versions, a
/// checksum mismatch followed by more data, or a malformed payload.
pub fn scan(data: &[u8]) -> EngineResult<Replay> {
    let mut replay = Replay::default();
    let mut pos = 0usize;

    while pos < data.len() {
        let offset = pos as u64;
        let rest = &data[pos..];

        if rest.len() < HEADER_LEN {
            break;
        }
        if rest[0..4] != RECORD_MAGIC {
            return Err(EngineError::corrupted(offset, "bad record magic"));
        }
        let version = u16::from_le_bytes([rest[4], rest[5]]);
        if version != RECORD_VERSION {
            return Err(EngineError::corrupted(
                offset,
                format!("unsupported record version {version}"),
            ));
        }
        let payload_len = u32::from_le_bytes([rest[6], rest[7], rest[8], rest[9]]) as usize;
        let total = HEADER_LEN + payload_len + CRC_LEN;
        if rest.len() < total {
            break;
        }

        let body = &rest[..HEADER_LEN + payload_len];
        let stored = u32::from_le_bytes([
            rest[total - 4],
            rest[total - 3],
            rest[total - 2],
            rest[total - 1],
        ]);
        if compute_crc32(body) != stored {
            if pos + total == data.len() {
                break;
            }
            return Err(EngineError::corrupted(offset, "checksum mismatch"));
        }

        let record = CommitRecord::decode_payload(&body[HEADER_LEN..], offset)?;
        replay.records.push(record);
        pos += total;
        replay.valid_len = pos as u64;
    }

    Ok(replay)
}

/// Computes the IEEE CRC32 checksum of `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

fn len_u32(len: usize, what: &str) -> EngineResult<u32> {
    u32::try_from(len)
        .map_err(|_| EngineError::invalid_operation(format!("{what} too large: {len} bytes")))
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8], what: &str) -> EngineResult<()> {
    out.extend_from_slice(&len_u32(bytes.len(), what)?.to_le_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    offset: u64,
}

impl Cursor<'_> {
    fn take(&mut self, n: usize) -> EngineResult<&[u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| EngineError::corrupted(self.offset, "unexpected end of payload"))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> EngineResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> EngineResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u64(&mut self) -> EngineResult<u64> {
        let b = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_le_bytes(buf))
    }

    fn read_bytes(&mut self) -> EngineResult<Vec<u8>> {
        let len = self.read_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(sequence: u64) -> CommitRecord {
        CommitRecord {
            sequence,
            ops: vec![
                LogOp::Put {
                    key: b"Player:data:alice".to_vec(),
                    value: vec![0x82, 0x01, 0x61],
                },
                LogOp::Delete {
                    key: b"Player:data:bob".to_vec(),
                },
            ],
        }
    }

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }

    #[test]
    fn scan_reads_records_in_order() {
        let mut log = sample(1).encode().unwrap();
        log.extend(sample(2).encode().unwrap());

        let replay = scan(&log).unwrap();
        assert_eq!(replay.records, vec![sample(1), sample(2)]);
        assert_eq!(replay.valid_len, log.len() as u64);
    }

    #[test]
    fn truncated_tail_is_torn() {
        let first = sample(1).encode().unwrap();
        let mut log = first.clone();
        let second = sample(2).encode().unwrap();
        log.extend_from_slice(&second[..second.len() - 3]);

        let replay = scan(&log).unwrap();
        assert_eq!(replay.records.len(), 1);
        assert_eq!(replay.valid_len, first.len() as u64);
        assert!(replay.has_torn_tail(log.len() as u64));
    }

    #[test]
    fn bad_checksum_on_last_record_is_torn() {
        let mut log = sample(1).encode().unwrap();
        let last = log.len() - 1;
        log[last] ^= 0xFF;

        let replay = scan(&log).unwrap();
        assert!(replay.records.is_empty());
        assert_eq!(replay.valid_len, 0);
    }

    #[test]
    fn bad_checksum_mid_log_is_corruption() {
        let mut log = sample(1).encode().unwrap();
        log[12] ^= 0xFF;
        log.extend(sample(2).encode().unwrap());

        let err = scan(&log).unwrap_err();
        assert!(matches!(err, EngineError::Corrupted { offset: 0, .. }));
    }

    #[test]
    fn bad_magic_is_corruption() {
        let mut log = sample(1).encode().unwrap();
        log[0] = b'X';
        assert!(matches!(
            scan(&log).unwrap_err(),
            EngineError::Corrupted { .. }
        ));
    }

    #[test]
    fn empty_record_has_no_ops() {
        let record = CommitRecord {
            sequence: 7,
            ops: Vec::new(),
        };
        let replay = scan(&record.encode().unwrap()).unwrap();
        assert_eq!(replay.records, vec![record]);
    }
}
