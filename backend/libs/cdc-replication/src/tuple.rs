//! Tuple datums as they arrive on the wire, and their decoded values.

use bytes::Bytes;

/// One column datum of a pgoutput `TupleData` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TupleColumn {
    /// `n`
    Null,
    /// `u`: TOASTed value that did not change. No data is sent.
    UnchangedToast,
    /// `t`
    Text(Bytes),
    /// `b`: binary format datum
    Binary(Bytes),
}

impl TupleColumn {
    pub fn text(value: impl Into<String>) -> Self {
        TupleColumn::Text(Bytes::from(value.into()))
    }

    /// Wire tag byte for this datum.
    pub fn tag(&self) -> u8 {
        match self {
            TupleColumn::Null => b'n',
            TupleColumn::UnchangedToast => b'u',
            TupleColumn::Text(_) => b't',
            TupleColumn::Binary(_) => b'b',
        }
    }
}

/// Decoded column value.
///
/// SQL NULL stays distinguishable from an empty string here; collapsing the two
/// is left to the row builder, which knows which columns tolerate it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnValue {
    Null,
    Text(String),
    /// Bytes passed through untouched (binary or unchanged-toast datums).
    Raw(Vec<u8>),
}

impl ColumnValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }

    /// Text view of the value; NULL reads as `None`, raw bytes lossily as UTF-8.
    pub fn as_text(&self) -> Option<String> {
        match self {
            ColumnValue::Null => None,
            ColumnValue::Text(s) => Some(s.clone()),
            ColumnValue::Raw(b) => Some(String::from_utf8_lossy(b).into_owned()),
        }
    }
}

impl From<&TupleColumn> for ColumnValue {
    fn from(column: &TupleColumn) -> Self {
        match column {
            TupleColumn::Text(data) => ColumnValue::Text(String::from_utf8_lossy(data).into_owned()),
            TupleColumn::Null => ColumnValue::Null,
            TupleColumn::Binary(data) => ColumnValue::Raw(data.to_vec()),
            TupleColumn::UnchangedToast => ColumnValue::Raw(Vec::new()),
        }
    }
}
