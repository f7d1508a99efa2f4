use bytes::{Buf, BufMut};
use chrono::{DateTime, Utc};

use crate::common::{BasaltError, BlockId, Result, TxId};

use super::super::transaction::Transaction;

const CHECKPOINT: i32 = 0;
const START: i32 = 1;
const COMMIT: i32 = 2;
const ROLLBACK: i32 = 3;
const SET_INT: i32 = 4;
const SET_STRING: i32 = 5;
const SET_BIT: i32 = 6;
const SET_DATETIME: i32 = 7;

/// Transaction number carried by records with no transaction association.
const DUMMY_TX: TxId = 0;

/// One typed entry in the write-ahead log.
///
/// Data-mutating kinds carry both the before-image (for undo) and the
/// after-image (for redo) of the changed field. Wire layout: a 4-byte kind
/// discriminator, the transaction number, then the per-kind fields, all
/// little-endian; strings use the page encoding (byte-length prefix plus
/// UTF-16 code units) and datetimes are tick-encoded i64 microseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    Checkpoint,
    Start {
        tx: TxId,
    },
    Commit {
        tx: TxId,
    },
    Rollback {
        tx: TxId,
    },
    SetInt {
        tx: TxId,
        blk: BlockId,
        offset: usize,
        old: i32,
        new: i32,
    },
    SetString {
        tx: TxId,
        blk: BlockId,
        offset: usize,
        old: String,
        new: String,
    },
    /// One bit inside a 4-byte field, used for nullability flags.
    SetBit {
        tx: TxId,
        blk: BlockId,
        offset: usize,
        bit: u32,
        old: bool,
        new: bool,
    },
    SetDateTime {
        tx: TxId,
        blk: BlockId,
        offset: usize,
        old_ticks: i64,
        new_ticks: i64,
    },
}

impl LogRecord {
    /// Transaction this record belongs to; None for checkpoints.
    pub fn tx_id(&self) -> Option<TxId> {
        match self {
            LogRecord::Checkpoint => None,
            LogRecord::Start { tx }
            | LogRecord::Commit { tx }
            | LogRecord::Rollback { tx }
            | LogRecord::SetInt { tx, .. }
            | LogRecord::SetString { tx, .. }
            | LogRecord::SetBit { tx, .. }
            | LogRecord::SetDateTime { tx, .. } => Some(*tx),
        }
    }

    /// Reverts the write by re-pinning the block and storing the old value,
    /// without producing a new log record.
    pub fn undo(&self, tx: &mut Transaction) -> Result<()> {
        self.apply_image(tx, false)
    }

    /// Replays the write by storing the new value, unlogged. Idempotent.
    pub fn redo(&self, tx: &mut Transaction) -> Result<()> {
        self.apply_image(tx, true)
    }

    fn apply_image(&self, tx: &mut Transaction, redo: bool) -> Result<()> {
        match self {
            LogRecord::SetInt {
                blk, offset, old, new, ..
            } => {
                tx.pin(blk)?;
                tx.set_int(blk, *offset, if redo { *new } else { *old }, false)?;
                tx.unpin(blk);
            }
            LogRecord::SetString {
                blk, offset, old, new, ..
            } => {
                tx.pin(blk)?;
                tx.set_string(blk, *offset, if redo { new } else { old }, false)?;
                tx.unpin(blk);
            }
            LogRecord::SetBit {
                blk,
                offset,
                bit,
                old,
                new,
                ..
            } => {
                tx.pin(blk)?;
                tx.set_bit(blk, *offset, *bit, if redo { *new } else { *old }, false)?;
                tx.unpin(blk);
            }
            LogRecord::SetDateTime {
                blk,
                offset,
                old_ticks,
                new_ticks,
                ..
            } => {
                let ticks = if redo { *new_ticks } else { *old_ticks };
                tx.pin(blk)?;
                tx.set_datetime(blk, *offset, ticks_to_datetime(ticks), false)?;
                tx.unpin(blk);
            }
            // Control records have nothing to undo or redo.
            _ => {}
        }
        Ok(())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            LogRecord::Checkpoint => {
                buf.put_i32_le(CHECKPOINT);
                buf.put_u64_le(DUMMY_TX);
            }
            LogRecord::Start { tx } => {
                buf.put_i32_le(START);
                buf.put_u64_le(*tx);
            }
            LogRecord::Commit { tx } => {
                buf.put_i32_le(COMMIT);
                buf.put_u64_le(*tx);
            }
            LogRecord::Rollback { tx } => {
                buf.put_i32_le(ROLLBACK);
                buf.put_u64_le(*tx);
            }
            LogRecord::SetInt {
                tx, blk, offset, old, new,
            } => {
                buf.put_i32_le(SET_INT);
                buf.put_u64_le(*tx);
                put_block(&mut buf, blk);
                buf.put_u32_le(*offset as u32);
                buf.put_i32_le(*old);
                buf.put_i32_le(*new);
            }
            LogRecord::SetString {
                tx, blk, offset, old, new,
            } => {
                buf.put_i32_le(SET_STRING);
                buf.put_u64_le(*tx);
                put_block(&mut buf, blk);
                buf.put_u32_le(*offset as u32);
                put_string(&mut buf, old);
                put_string(&mut buf, new);
            }
            LogRecord::SetBit {
                tx, blk, offset, bit, old, new,
            } => {
                buf.put_i32_le(SET_BIT);
                buf.put_u64_le(*tx);
                put_block(&mut buf, blk);
                buf.put_u32_le(*offset as u32);
                buf.put_u32_le(*bit);
                buf.put_u8(*old as u8);
                buf.put_u8(*new as u8);
            }
            LogRecord::SetDateTime {
                tx, blk, offset, old_ticks, new_ticks,
            } => {
                buf.put_i32_le(SET_DATETIME);
                buf.put_u64_le(*tx);
                put_block(&mut buf, blk);
                buf.put_u32_le(*offset as u32);
                buf.put_i64_le(*old_ticks);
                buf.put_i64_le(*new_ticks);
            }
        }
        buf
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        if buf.remaining() < 12 {
            return Err(BasaltError::LogCorrupt("truncated record header".into()));
        }
        let kind = buf.get_i32_le();
        let tx = buf.get_u64_le();
        let rec = match kind {
            CHECKPOINT => LogRecord::Checkpoint,
            START => LogRecord::Start { tx },
            COMMIT => LogRecord::Commit { tx },
            ROLLBACK => LogRecord::Rollback { tx },
            SET_INT => {
                let blk = get_block(&mut buf)?;
                check(&buf, 12)?;
                LogRecord::SetInt {
                    tx,
                    blk,
                    offset: buf.get_u32_le() as usize,
                    old: buf.get_i32_le(),
                    new: buf.get_i32_le(),
                }
            }
            SET_STRING => {
                let blk = get_block(&mut buf)?;
                check(&buf, 4)?;
                let offset = buf.get_u32_le() as usize;
                let old = get_string(&mut buf)?;
                let new = get_string(&mut buf)?;
                LogRecord::SetString {
                    tx,
                    blk,
                    offset,
                    old,
                    new,
                }
            }
            SET_BIT => {
                let blk = get_block(&mut buf)?;
                check(&buf, 10)?;
                LogRecord::SetBit {
                    tx,
                    blk,
                    offset: buf.get_u32_le() as usize,
                    bit: buf.get_u32_le(),
                    old: buf.get_u8() != 0,
                    new: buf.get_u8() != 0,
                }
            }
            SET_DATETIME => {
                let blk = get_block(&mut buf)?;
                check(&buf, 20)?;
                LogRecord::SetDateTime {
                    tx,
                    blk,
                    offset: buf.get_u32_le() as usize,
                    old_ticks: buf.get_i64_le(),
                    new_ticks: buf.get_i64_le(),
                }
            }
            other => {
                return Err(BasaltError::LogCorrupt(format!(
                    "unknown record kind {}",
                    other
                )))
            }
        };
        Ok(rec)
    }
}

pub fn ticks_to_datetime(ticks: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_micros(ticks).unwrap_or_default()
}

fn put_block(buf: &mut Vec<u8>, blk: &BlockId) {
    put_string(buf, blk.file_name());
    buf.put_u64_le(blk.num());
}

fn get_block(buf: &mut &[u8]) -> Result<BlockId> {
    let file_name = get_string(buf)?;
    check(buf, 8)?;
    Ok(BlockId::new(file_name, buf.get_u64_le()))
}

fn put_string(buf: &mut Vec<u8>, text: &str) {
    let units: Vec<u16> = text.encode_utf16().collect();
    buf.put_u32_le((units.len() * 2) as u32);
    for unit in units {
        buf.put_u16_le(unit);
    }
}

fn get_string(buf: &mut &[u8]) -> Result<String> {
    check(buf, 4)?;
    let len = buf.get_u32_le() as usize;
    check(buf, len)?;
    let mut units = Vec::with_capacity(len / 2);
    for _ in 0..len / 2 {
        units.push(buf.get_u16_le());
    }
    Ok(String::from_utf16_lossy(&units))
}

fn check(buf: &&[u8], need: usize) -> Result<()> {
    if buf.remaining() < need {
        return Err(BasaltError::LogCorrupt("truncated record".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(rec: LogRecord) {
        let decoded = LogRecord::decode(&rec.encode()).unwrap();
        assert_eq!(decoded, rec);
    }

    #[test]
    fn test_control_records_round_trip() {
        round_trip(LogRecord::Checkpoint);
        round_trip(LogRecord::Start { tx: 7 });
        round_trip(LogRecord::Commit { tx: 7 });
        round_trip(LogRecord::Rollback { tx: 9 });
    }

    #[test]
    fn test_set_records_round_trip() {
        let blk = BlockId::new("users.tbl", 12);
        round_trip(LogRecord::SetInt {
            tx: 3,
            blk: blk.clone(),
            offset: 80,
            old: 1,
            new: 9999,
        });
        round_trip(LogRecord::SetString {
            tx: 3,
            blk: blk.clone(),
            offset: 40,
            old: "a".into(),
            new: "one".into(),
        });
        round_trip(LogRecord::SetBit {
            tx: 3,
            blk: blk.clone(),
            offset: 0,
            bit: 5,
            old: false,
            new: true,
        });
        round_trip(LogRecord::SetDateTime {
            tx: 3,
            blk,
            offset: 16,
            old_ticks: 0,
            new_ticks: 1_700_000_000_000_000,
        });
    }

    #[test]
    fn test_discriminator_is_first_word() {
        let rec = LogRecord::Commit { tx: 1 }.encode();
        assert_eq!(i32::from_le_bytes(rec[0..4].try_into().unwrap()), 2);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(LogRecord::decode(&[]).is_err());
        assert!(LogRecord::decode(&[0xFF; 12]).is_err());

        let mut truncated = LogRecord::SetString {
            tx: 1,
            blk: BlockId::new("t", 0),
            offset: 0,
            old: "abc".into(),
            new: "def".into(),
        }
        .encode();
        truncated.truncate(truncated.len() - 3);
        assert!(LogRecord::decode(&truncated).is_err());
    }
}
