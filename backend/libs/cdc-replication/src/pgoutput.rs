//! Parser for the `pgoutput` logical decoding plugin (protocol version 1).
//!
//! Only the messages the outbox pipeline acts on are decoded in full:
//! `Relation` and `Insert`, plus the transaction boundaries. Everything else is
//! surfaced as [`LogicalMessage::Other`] so the caller can keep its position
//! moving without interpreting it.

use bytes::{Buf, Bytes};

use crate::error::{DecodeError, DecodeResult};
use crate::lsn::Lsn;
use crate::relation::{ColumnDef, RelationId, RelationSchema};
use crate::tuple::TupleColumn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeginBody {
    pub final_lsn: Lsn,
    /// Microseconds since 2000-01-01 UTC.
    pub commit_time: i64,
    pub xid: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitBody {
    pub flags: u8,
    pub commit_lsn: Lsn,
    pub end_lsn: Lsn,
    pub commit_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertBody {
    pub relation_id: RelationId,
    pub tuple: Vec<TupleColumn>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicalMessage {
    Begin(BeginBody),
    Commit(CommitBody),
    Relation(RelationSchema),
    Insert(InsertBody),
    /// Update, Delete, Truncate, Type, Origin, Message: not captured.
    Other { tag: u8 },
}

impl LogicalMessage {
    pub fn tag(&self) -> u8 {
        match self {
            LogicalMessage::Begin(_) => b'B',
            LogicalMessage::Commit(_) => b'C',
            LogicalMessage::Relation(_) => b'R',
            LogicalMessage::Insert(_) => b'I',
            LogicalMessage::Other { tag } => *tag,
        }
    }
}

/// Parse one pgoutput message.
pub fn parse(data: &[u8]) -> DecodeResult<LogicalMessage> {
    let mut r = Reader::new(Bytes::copy_from_slice(data));
    let tag = r.u8("message tag")?;

    match tag {
        b'B' => Ok(LogicalMessage::Begin(BeginBody {
            final_lsn: Lsn(r.u64("begin final lsn")?),
            commit_time: r.i64("begin timestamp")?,
            xid: r.u32("begin xid")?,
        })),
        b'C' => Ok(LogicalMessage::Commit(CommitBody {
            flags: r.u8("commit flags")?,
            commit_lsn: Lsn(r.u64("commit lsn")?),
            end_lsn: Lsn(r.u64("commit end lsn")?),
            commit_time: r.i64("commit timestamp")?,
        })),
        b'R' => parse_relation(&mut r).map(LogicalMessage::Relation),
        b'I' => parse_insert(&mut r).map(LogicalMessage::Insert),
        b'U' | b'D' | b'T' | b'Y' | b'O' | b'M' => Ok(LogicalMessage::Other { tag }),
        other => Err(DecodeError::Protocol(format!(
            "unknown pgoutput message tag 0x{:02x}",
            other
        ))),
    }
}

fn parse_relation(r: &mut Reader) -> DecodeResult<RelationSchema> {
    let id = r.u32("relation id")?;
    let namespace = r.cstr("relation namespace")?;
    let name = r.cstr("relation name")?;
    let _replica_identity = r.u8("replica identity")?;
    let ncols = r.u16("relation column count")?;

    let mut columns = Vec::with_capacity(ncols as usize);
    for _ in 0..ncols {
        let flags = r.u8("column flags")?;
        let col_name = r.cstr("column name")?;
        let type_oid = r.u32("column type oid")?;
        let _type_modifier = r.i32("column type modifier")?;
        columns.push(ColumnDef {
            name: col_name,
            type_oid,
            flags,
        });
    }

    Ok(RelationSchema {
        id,
        namespace: if namespace.is_empty() {
            // pgoutput sends an empty namespace for pg_catalog
            "pg_catalog".to_string()
        } else {
            namespace
        },
        name,
        columns,
    })
}

fn parse_insert(r: &mut Reader) -> DecodeResult<InsertBody> {
    let relation_id = r.u32("insert relation id")?;
    let marker = r.u8("insert tuple marker")?;
    if marker != b'N' {
        return Err(DecodeError::Protocol(format!(
            "expected new-tuple marker 'N' in insert, got 0x{:02x}",
            marker
        )));
    }
    let tuple = parse_tuple(r)?;
    Ok(InsertBody { relation_id, tuple })
}

fn parse_tuple(r: &mut Reader) -> DecodeResult<Vec<TupleColumn>> {
    let ncols = r.u16("tuple column count")?;
    let mut columns = Vec::with_capacity(ncols as usize);
    for _ in 0..ncols {
        let kind = r.u8("tuple column kind")?;
        let column = match kind {
            b'n' => TupleColumn::Null,
            b'u' => TupleColumn::UnchangedToast,
            b't' => TupleColumn::Text(r.sized("text datum")?),
            b'b' => TupleColumn::Binary(r.sized("binary datum")?),
            other => {
                return Err(DecodeError::Protocol(format!(
                    "unknown tuple column kind 0x{:02x}",
                    other
                )))
            }
        };
        columns.push(column);
    }
    Ok(columns)
}

/// Bounds-checked cursor; `bytes::Buf` getters panic on short input.
struct Reader {
    buf: Bytes,
}

impl Reader {
    fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    fn need(&self, n: usize, what: &str) -> DecodeResult<()> {
        if self.buf.remaining() < n {
            return Err(DecodeError::Protocol(format!(
                "truncated message reading {}: need {} bytes, have {}",
                what,
                n,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    fn u8(&mut self, what: &str) -> DecodeResult<u8> {
        self.need(1, what)?;
        Ok(self.buf.get_u8())
    }

    fn u16(&mut self, what: &str) -> DecodeResult<u16> {
        self.need(2, what)?;
        Ok(self.buf.get_u16())
    }

    fn u32(&mut self, what: &str) -> DecodeResult<u32> {
        self.need(4, what)?;
        Ok(self.buf.get_u32())
    }

    fn i32(&mut self, what: &str) -> DecodeResult<i32> {
        self.need(4, what)?;
        Ok(self.buf.get_i32())
    }

    fn u64(&mut self, what: &str) -> DecodeResult<u64> {
        self.need(8, what)?;
        Ok(self.buf.get_u64())
    }

    fn i64(&mut self, what: &str) -> DecodeResult<i64> {
        self.need(8, what)?;
        Ok(self.buf.get_i64())
    }

    fn cstr(&mut self, what: &str) -> DecodeResult<String> {
        let end = self
            .buf
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| DecodeError::Protocol(format!("unterminated string reading {}", what)))?;
        let s = String::from_utf8_lossy(&self.buf[..end]).into_owned();
        self.buf.advance(end + 1);
        Ok(s)
    }

    fn sized(&mut self, what: &str) -> DecodeResult<Bytes> {
        let len = self.i32(what)?;
        if len < 0 {
            return Err(DecodeError::Protocol(format!(
                "negative length {} reading {}",
                len, what
            )));
        }
        let len = len as usize;
        self.need(len, what)?;
        Ok(self.buf.split_to(len))
    }
}

#[cfg(any(test, feature = "fixtures"))]
pub mod encode {
    //! Minimal encoders used to build wire fixtures in tests.

    use bytes::{BufMut, BytesMut};

    use crate::tuple::TupleColumn;

    pub fn relation(id: u32, namespace: &str, name: &str, columns: &[&str]) -> Vec<u8> {
        let mut b = BytesMut::new();
        b.put_u8(b'R');
        b.put_u32(id);
        put_cstr(&mut b, namespace);
        put_cstr(&mut b, name);
        b.put_u8(b'd');
        b.put_u16(columns.len() as u16);
        for (i, col) in columns.iter().enumerate() {
            b.put_u8(if i == 0 { 1 } else { 0 });
            put_cstr(&mut b, col);
            b.put_u32(25); // text
            b.put_i32(-1);
        }
        b.to_vec()
    }

    pub fn insert(relation_id: u32, tuple: &[TupleColumn]) -> Vec<u8> {
        let mut b = BytesMut::new();
        b.put_u8(b'I');
        b.put_u32(relation_id);
        b.put_u8(b'N');
        b.put_u16(tuple.len() as u16);
        for col in tuple {
            b.put_u8(col.tag());
            match col {
                TupleColumn::Text(data) | TupleColumn::Binary(data) => {
                    b.put_i32(data.len() as i32);
                    b.put_slice(data);
                }
                TupleColumn::Null | TupleColumn::UnchangedToast => {}
            }
        }
        b.to_vec()
    }

    pub fn begin(final_lsn: u64, xid: u32) -> Vec<u8> {
        let mut b = BytesMut::new();
        b.put_u8(b'B');
        b.put_u64(final_lsn);
        b.put_i64(0);
        b.put_u32(xid);
        b.to_vec()
    }

    pub fn commit(commit_lsn: u64, end_lsn: u64) -> Vec<u8> {
        let mut b = BytesMut::new();
        b.put_u8(b'C');
        b.put_u8(0);
        b.put_u64(commit_lsn);
        b.put_u64(end_lsn);
        b.put_i64(0);
        b.to_vec()
    }

    fn put_cstr(b: &mut BytesMut, s: &str) {
        b.put_slice(s.as_bytes());
        b.put_u8(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_relation() {
        let data = encode::relation(16384, "public", "outbox_events", &["id", "type"]);
        let msg = parse(&data).unwrap();
        match msg {
            LogicalMessage::Relation(schema) => {
                assert_eq!(schema.id, 16384);
                assert_eq!(schema.qualified_name(), "public.outbox_events");
                assert_eq!(schema.column_names().collect::<Vec<_>>(), vec!["id", "type"]);
                assert_eq!(schema.columns[0].flags, 1);
            }
            other => panic!("expected relation, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_insert_with_null_and_toast() {
        let data = encode::insert(
            9,
            &[
                TupleColumn::text("e1"),
                TupleColumn::Null,
                TupleColumn::UnchangedToast,
            ],
        );
        let msg = parse(&data).unwrap();
        assert_eq!(
            msg,
            LogicalMessage::Insert(InsertBody {
                relation_id: 9,
                tuple: vec![
                    TupleColumn::text("e1"),
                    TupleColumn::Null,
                    TupleColumn::UnchangedToast
                ],
            })
        );
    }

    #[test]
    fn test_parse_commit() {
        let msg = parse(&encode::commit(0x16B3748, 0x16B3778)).unwrap();
        match msg {
            LogicalMessage::Commit(c) => {
                assert_eq!(c.commit_lsn, Lsn(0x16B3748));
                assert_eq!(c.end_lsn, Lsn(0x16B3778));
            }
            other => panic!("expected commit, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_insert_is_protocol_error() {
        let mut data = encode::insert(9, &[TupleColumn::text("abcdef")]);
        data.truncate(data.len() - 3);
        let err = parse(&data).unwrap_err();
        assert!(matches!(err, DecodeError::Protocol(_)));
    }

    #[test]
    fn test_update_is_passed_through() {
        assert_eq!(parse(b"U\0\0\0\x01").unwrap(), LogicalMessage::Other { tag: b'U' });
    }

    #[test]
    fn test_unknown_tag_rejected() {
        assert!(matches!(parse(b"Z").unwrap_err(), DecodeError::Protocol(_)));
        assert!(matches!(parse(b"").unwrap_err(), DecodeError::Protocol(_)));
    }
}
