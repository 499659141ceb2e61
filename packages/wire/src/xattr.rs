//! Length-prefixed encoding for batched extended-attribute requests.
//!
//! Body layout (all integers big-endian):
//!
//! ```text
//! path    : bytes, NUL terminated
//! count   : u16
//! shape   : u8      0 = names only, 1 = names and values
//! record* : status u16, name_len u16, name bytes
//!           [value_len u32, value bytes]     (shape 1 only)
//! ```
//!
//! Get, delete and list requests use the name-only shape; set requests and
//! get/list answers carry values.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Maximum number of attributes in one request.
pub const MAX_ENTRIES: usize = 16;

/// Maximum length of an attribute name in bytes.
pub const MAX_NAME_LEN: usize = 248;

/// Maximum length of an attribute value in bytes.
pub const MAX_VALUE_LEN: usize = 65536;

const SHAPE_NAMES: u8 = 0;
const SHAPE_VALUES: u8 = 1;

/// One extended attribute, used both for requests and for answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeEntry {
    pub name: String,
    pub value: Option<Vec<u8>>,
    /// Per-entry status reported by the server, zero when fine.
    pub status: u16,
}

impl AttributeEntry {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            status: 0,
        }
    }

    pub fn with_value(name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            status: 0,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 0
    }

    /// The value as UTF-8 text, if present and valid.
    pub fn value_str(&self) -> Option<&str> {
        self.value
            .as_deref()
            .and_then(|v| std::str::from_utf8(v).ok())
    }
}

/// Record layout of an encoded body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordShape {
    NamesOnly,
    NamesAndValues,
}

impl RecordShape {
    fn of(entries: &[AttributeEntry]) -> Result<Self> {
        let with_values = entries.iter().filter(|e| e.value.is_some()).count();
        if with_values == 0 {
            Ok(RecordShape::NamesOnly)
        } else if with_values == entries.len() {
            Ok(RecordShape::NamesAndValues)
        } else {
            Err(Error::invalid(
                "attribute list mixes entries with and without values",
            ))
        }
    }
}

/// A decoded attribute body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeBody {
    pub path: String,
    pub shape: RecordShape,
    pub entries: Vec<AttributeEntry>,
}

/// Encode `entries` for `path`. The shape follows the entries: either none
/// or all of them carry a value.
pub fn encode(entries: &[AttributeEntry], path: &str) -> Result<Bytes> {
    if path.as_bytes().contains(&0) {
        return Err(Error::invalid("path contains a NUL byte"));
    }
    if entries.len() > MAX_ENTRIES {
        return Err(Error::invalid(format!(
            "too many attributes: {} (at most {})",
            entries.len(),
            MAX_ENTRIES
        )));
    }
    let shape = RecordShape::of(entries)?;

    let mut buf = BytesMut::with_capacity(path.len() + 4 + entries.len() * 16);
    buf.put_slice(path.as_bytes());
    buf.put_u8(0);
    buf.put_u16(entries.len() as u16);
    buf.put_u8(match shape {
        RecordShape::NamesOnly => SHAPE_NAMES,
        RecordShape::NamesAndValues => SHAPE_VALUES,
    });

    for entry in entries {
        if entry.name.is_empty() || entry.name.len() > MAX_NAME_LEN {
            return Err(Error::invalid(format!(
                "attribute name must be 1..={} bytes, got {}",
                MAX_NAME_LEN,
                entry.name.len()
            )));
        }
        buf.put_u16(entry.status);
        buf.put_u16(entry.name.len() as u16);
        buf.put_slice(entry.name.as_bytes());

        if let Some(value) = &entry.value {
            if value.len() > MAX_VALUE_LEN {
                return Err(Error::invalid(format!(
                    "value of attribute '{}' exceeds {} bytes",
                    entry.name, MAX_VALUE_LEN
                )));
            }
            buf.put_u32(value.len() as u32);
            buf.put_slice(value);
        }
    }

    Ok(buf.freeze())
}

/// Decode the entries of an encoded body.
pub fn decode(bytes: &[u8]) -> Result<Vec<AttributeEntry>> {
    decode_body(bytes).map(|body| body.entries)
}

/// Decode a full body, including its path and record shape.
pub fn decode_body(bytes: &[u8]) -> Result<AttributeBody> {
    let nul = bytes
        .iter()
        .position(|b| *b == 0)
        .ok_or_else(|| Error::protocol("attribute body has no path terminator"))?;
    let path = std::str::from_utf8(&bytes[..nul])
        .map_err(|e| Error::protocol(format!("attribute path is not UTF-8: {}", e)))?
        .to_string();

    let mut rest = &bytes[nul + 1..];
    need(rest, 3, "entry count")?;
    let count = rest.get_u16() as usize;
    let shape = match rest.get_u8() {
        SHAPE_NAMES => RecordShape::NamesOnly,
        SHAPE_VALUES => RecordShape::NamesAndValues,
        other => return Err(Error::protocol(format!("unknown record shape {}", other))),
    };

    let mut entries = Vec::with_capacity(count.min(MAX_ENTRIES));
    for index in 0..count {
        need(rest, 4, "record header")?;
        let status = rest.get_u16();
        let name_len = rest.get_u16() as usize;
        need(rest, name_len, "attribute name")?;
        let name = std::str::from_utf8(&rest[..name_len])
            .map_err(|e| Error::protocol(format!("name of record {} is not UTF-8: {}", index, e)))?
            .to_string();
        rest.advance(name_len);

        let value = match shape {
            RecordShape::NamesOnly => None,
            RecordShape::NamesAndValues => {
                need(rest, 4, "value length")?;
                let value_len = rest.get_u32() as usize;
                need(rest, value_len, "attribute value")?;
                let value = rest[..value_len].to_vec();
                rest.advance(value_len);
                Some(value)
            }
        };

        entries.push(AttributeEntry {
            name,
            value,
            status,
        });
    }

    if !rest.is_empty() {
        return Err(Error::protocol(format!(
            "{} trailing bytes after attribute records",
            rest.len()
        )));
    }

    Ok(AttributeBody {
        path,
        shape,
        entries,
    })
}

fn need(rest: &[u8], len: usize, what: &str) -> Result<()> {
    if rest.len() < len {
        Err(Error::protocol(format!(
            "{} runs past the end of the buffer ({} bytes needed, {} left)",
            what,
            len,
            rest.len()
        )))
    } else {
        Ok(())
    }
}
