use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{Lsn, PageId, Rid, TxnId, INVALID_LSN};
use crate::storage::tuple::Tuple;

/// Fixed header preceding every log record (five little-endian i32
/// fields): | size | lsn | txn_id | prev_lsn | type |
pub const LOG_HEADER_SIZE: usize = 20;

/// Types of log records written to the WAL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum LogRecordType {
    Invalid = 0,
    Insert = 1,
    MarkDelete = 2,
    ApplyDelete = 3,
    RollbackDelete = 4,
    Update = 5,
    NewPage = 6,
    Begin = 7,
    Commit = 8,
    Abort = 9,
}

impl LogRecordType {
    fn from_i32(value: i32) -> Option<Self> {
        Some(match value {
            1 => Self::Insert,
            2 => Self::MarkDelete,
            3 => Self::ApplyDelete,
            4 => Self::RollbackDelete,
            5 => Self::Update,
            6 => Self::NewPage,
            7 => Self::Begin,
            8 => Self::Commit,
            9 => Self::Abort,
            _ => return None,
        })
    }
}

/// Type-specific body of a log record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogPayload {
    Insert { rid: Rid, tuple: Tuple },
    MarkDelete { rid: Rid, tuple: Tuple },
    ApplyDelete { rid: Rid, tuple: Tuple },
    RollbackDelete { rid: Rid, tuple: Tuple },
    Update { rid: Rid, old_tuple: Tuple, new_tuple: Tuple },
    NewPage { prev_page_id: PageId },
    Begin,
    Commit,
    Abort,
}

/// A WAL record. `prev_lsn` links records of one transaction into a
/// backward chain terminated by its BEGIN record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub size: i32,
    pub lsn: Lsn,
    pub txn_id: TxnId,
    pub prev_lsn: Lsn,
    pub payload: LogPayload,
}

impl LogRecord {
    fn new(txn_id: TxnId, prev_lsn: Lsn, payload: LogPayload) -> Self {
        let mut record = Self {
            size: 0,
            lsn: INVALID_LSN,
            txn_id,
            prev_lsn,
            payload,
        };
        record.size = record.computed_size() as i32;
        record
    }

    pub fn new_begin(txn_id: TxnId) -> Self {
        Self::new(txn_id, INVALID_LSN, LogPayload::Begin)
    }

    pub fn new_commit(txn_id: TxnId, prev_lsn: Lsn) -> Self {
        Self::new(txn_id, prev_lsn, LogPayload::Commit)
    }

    pub fn new_abort(txn_id: TxnId, prev_lsn: Lsn) -> Self {
        Self::new(txn_id, prev_lsn, LogPayload::Abort)
    }

    pub fn new_insert(txn_id: TxnId, prev_lsn: Lsn, rid: Rid, tuple: Tuple) -> Self {
        Self::new(txn_id, prev_lsn, LogPayload::Insert { rid, tuple })
    }

    pub fn new_mark_delete(txn_id: TxnId, prev_lsn: Lsn, rid: Rid, tuple: Tuple) -> Self {
        Self::new(txn_id, prev_lsn, LogPayload::MarkDelete { rid, tuple })
    }

    pub fn new_apply_delete(txn_id: TxnId, prev_lsn: Lsn, rid: Rid, tuple: Tuple) -> Self {
        Self::new(txn_id, prev_lsn, LogPayload::ApplyDelete { rid, tuple })
    }

    pub fn new_rollback_delete(txn_id: TxnId, prev_lsn: Lsn, rid: Rid, tuple: Tuple) -> Self {
        Self::new(txn_id, prev_lsn, LogPayload::RollbackDelete { rid, tuple })
    }

    pub fn new_update(
        txn_id: TxnId,
        prev_lsn: Lsn,
        rid: Rid,
        old_tuple: Tuple,
        new_tuple: Tuple,
    ) -> Self {
        Self::new(
            txn_id,
            prev_lsn,
            LogPayload::Update {
                rid,
                old_tuple,
                new_tuple,
            },
        )
    }

    pub fn new_new_page(txn_id: TxnId, prev_lsn: Lsn, prev_page_id: PageId) -> Self {
        Self::new(txn_id, prev_lsn, LogPayload::NewPage { prev_page_id })
    }

    pub fn record_type(&self) -> LogRecordType {
        match self.payload {
            LogPayload::Insert { .. } => LogRecordType::Insert,
            LogPayload::MarkDelete { .. } => LogRecordType::MarkDelete,
            LogPayload::ApplyDelete { .. } => LogRecordType::ApplyDelete,
            LogPayload::RollbackDelete { .. } => LogRecordType::RollbackDelete,
            LogPayload::Update { .. } => LogRecordType::Update,
            LogPayload::NewPage { .. } => LogRecordType::NewPage,
            LogPayload::Begin => LogRecordType::Begin,
            LogPayload::Commit => LogRecordType::Commit,
            LogPayload::Abort => LogRecordType::Abort,
        }
    }

    fn computed_size(&self) -> usize {
        LOG_HEADER_SIZE
            + match &self.payload {
                LogPayload::Insert { tuple, .. }
                | LogPayload::MarkDelete { tuple, .. }
                | LogPayload::ApplyDelete { tuple, .. }
                | LogPayload::RollbackDelete { tuple, .. } => {
                    Rid::SERIALIZED_SIZE + tuple.serialized_size()
                }
                LogPayload::Update {
                    old_tuple,
                    new_tuple,
                    ..
                } => Rid::SERIALIZED_SIZE + old_tuple.serialized_size() + new_tuple.serialized_size(),
                LogPayload::NewPage { .. } => 4,
                LogPayload::Begin | LogPayload::Commit | LogPayload::Abort => 0,
            }
    }

    /// Serialize into `buf`, which must hold at least `self.size` bytes.
    pub fn serialize_into(&self, buf: &mut [u8]) {
        LittleEndian::write_i32(&mut buf[0..4], self.size);
        LittleEndian::write_i32(&mut buf[4..8], self.lsn);
        LittleEndian::write_u32(&mut buf[8..12], self.txn_id);
        LittleEndian::write_i32(&mut buf[12..16], self.prev_lsn);
        LittleEndian::write_i32(&mut buf[16..20], self.record_type() as i32);

        let mut pos = LOG_HEADER_SIZE;
        match &self.payload {
            LogPayload::Insert { rid, tuple }
            | LogPayload::MarkDelete { rid, tuple }
            | LogPayload::ApplyDelete { rid, tuple }
            | LogPayload::RollbackDelete { rid, tuple } => {
                rid.write_to(&mut buf[pos..]);
                pos += Rid::SERIALIZED_SIZE;
                tuple.serialize_to(&mut buf[pos..]);
            }
            LogPayload::Update {
                rid,
                old_tuple,
                new_tuple,
            } => {
                rid.write_to(&mut buf[pos..]);
                pos += Rid::SERIALIZED_SIZE;
                pos += old_tuple.serialize_to(&mut buf[pos..]);
                new_tuple.serialize_to(&mut buf[pos..]);
            }
            LogPayload::NewPage { prev_page_id } => {
                LittleEndian::write_i32(&mut buf[pos..pos + 4], *prev_page_id);
            }
            LogPayload::Begin | LogPayload::Commit | LogPayload::Abort => {}
        }
    }

    /// Decode one record from the front of `buf`. Returns `None` for a
    /// truncated or malformed record, which ends a recovery scan.
    pub fn deserialize(buf: &[u8]) -> Option<Self> {
        if buf.len() < LOG_HEADER_SIZE {
            return None;
        }
        let size = LittleEndian::read_i32(&buf[0..4]);
        if size < LOG_HEADER_SIZE as i32 || size as usize > buf.len() {
            return None;
        }
        let lsn = LittleEndian::read_i32(&buf[4..8]);
        let txn_id = LittleEndian::read_u32(&buf[8..12]);
        let prev_lsn = LittleEndian::read_i32(&buf[12..16]);
        let record_type = LogRecordType::from_i32(LittleEndian::read_i32(&buf[16..20]))?;

        let body = &buf[LOG_HEADER_SIZE..size as usize];
        let payload = match record_type {
            LogRecordType::Insert
            | LogRecordType::MarkDelete
            | LogRecordType::ApplyDelete
            | LogRecordType::RollbackDelete => {
                if body.len() < Rid::SERIALIZED_SIZE {
                    return None;
                }
                let rid = Rid::read_from(body);
                let tuple = Tuple::deserialize_from(&body[Rid::SERIALIZED_SIZE..])?;
                match record_type {
                    LogRecordType::Insert => LogPayload::Insert { rid, tuple },
                    LogRecordType::MarkDelete => LogPayload::MarkDelete { rid, tuple },
                    LogRecordType::ApplyDelete => LogPayload::ApplyDelete { rid, tuple },
                    _ => LogPayload::RollbackDelete { rid, tuple },
                }
            }
            LogRecordType::Update => {
                if body.len() < Rid::SERIALIZED_SIZE {
                    return None;
                }
                let rid = Rid::read_from(body);
                let old_tuple = Tuple::deserialize_from(&body[Rid::SERIALIZED_SIZE..])?;
                let new_offset = Rid::SERIALIZED_SIZE + old_tuple.serialized_size();
                let new_tuple = Tuple::deserialize_from(&body[new_offset..])?;
                LogPayload::Update {
                    rid,
                    old_tuple,
                    new_tuple,
                }
            }
            LogRecordType::NewPage => {
                if body.len() < 4 {
                    return None;
                }
                LogPayload::NewPage {
                    prev_page_id: LittleEndian::read_i32(&body[0..4]),
                }
            }
            LogRecordType::Begin => LogPayload::Begin,
            LogRecordType::Commit => LogPayload::Commit,
            LogRecordType::Abort => LogPayload::Abort,
            LogRecordType::Invalid => return None,
        };

        Some(Self {
            size,
            lsn,
            txn_id,
            prev_lsn,
            payload,
        })
    }
}
