//! Primitive-typed value and the primitive-map wire format (spec.md §3, §4.1).
//!
//! Grounded on `activemq-cpp/src/main/activemq/util/{PrimitiveMap,PrimitiveList}.cpp`
//! (`original_source`) for the exact marshal shape: `i32` entry/item count,
//! then for maps a `u16` key length + modified-UTF-8 key bytes, then a `u8`
//! type tag, then the tag-specific value. Encoded with `byteorder`, the same
//! crate `hdbconnect_impl`'s `Part` codec uses for every multi-byte field.

use crate::codec::modified_utf8;
use crate::error::{DecodeErrorKind, OpenWireError, OpenWireResult};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::collections::BTreeMap;
use std::io::{Read, Write};

#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveValue {
    Null,
    Bool(bool),
    Byte(u8),
    Char(char),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<PrimitiveValue>),
    Map(PrimitiveMap),
}

/// Primitive-typed maps may nest (spec.md §3); kept as an insertion-order-free
/// `BTreeMap` since the wire format never relies on key ordering.
pub type PrimitiveMap = BTreeMap<String, PrimitiveValue>;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Null = 0,
    Bool = 1,
    Byte = 2,
    Char = 3,
    Short = 4,
    Int = 5,
    Long = 6,
    Float = 7,
    Double = 8,
    String = 9,
    BigString = 10,
    Bytes = 11,
    List = 12,
    Map = 13,
}

impl Tag {
    fn from_u8(v: u8) -> OpenWireResult<Self> {
        Ok(match v {
            0 => Self::Null,
            1 => Self::Bool,
            2 => Self::Byte,
            3 => Self::Char,
            4 => Self::Short,
            5 => Self::Int,
            6 => Self::Long,
            7 => Self::Float,
            8 => Self::Double,
            9 => Self::String,
            10 => Self::BigString,
            11 => Self::Bytes,
            12 => Self::List,
            13 => Self::Map,
            _ => {
                return Err(OpenWireError::decode(
                    DecodeErrorKind::UnknownPrimitiveTag,
                    0,
                ))
            }
        })
    }
}

impl PrimitiveValue {
    fn tag(&self) -> Tag {
        match self {
            Self::Null => Tag::Null,
            Self::Bool(_) => Tag::Bool,
            Self::Byte(_) => Tag::Byte,
            Self::Char(_) => Tag::Char,
            Self::Short(_) => Tag::Short,
            Self::Int(_) => Tag::Int,
            Self::Long(_) => Tag::Long,
            Self::Float(_) => Tag::Float,
            Self::Double(_) => Tag::Double,
            Self::String(s) => {
                if modified_utf8::requires_big_string(s) {
                    Tag::BigString
                } else {
                    Tag::String
                }
            }
            Self::Bytes(_) => Tag::Bytes,
            Self::List(_) => Tag::List,
            Self::Map(_) => Tag::Map,
        }
    }

    pub fn marshal(&self, w: &mut dyn Write) -> OpenWireResult<()> {
        w.write_u8(self.tag() as u8)?;
        match self {
            Self::Null => {}
            Self::Bool(b) => w.write_u8(u8::from(*b))?,
            Self::Byte(b) => w.write_u8(*b)?,
            Self::Char(c) => w.write_u16::<BigEndian>(*c as u16)?,
            Self::Short(v) => w.write_i16::<BigEndian>(*v)?,
            Self::Int(v) => w.write_i32::<BigEndian>(*v)?,
            Self::Long(v) => w.write_i64::<BigEndian>(*v)?,
            Self::Float(v) => w.write_f32::<BigEndian>(*v)?,
            Self::Double(v) => w.write_f64::<BigEndian>(*v)?,
            Self::String(s) => marshal_string(s, w)?,
            Self::Bytes(b) => {
                w.write_i32::<BigEndian>(i32::try_from(b.len()).map_err(|_| {
                    OpenWireError::decode(DecodeErrorKind::SizeOverflow, 0)
                })?)?;
                w.write_all(b)?;
            }
            Self::List(items) => {
                w.write_i32::<BigEndian>(i32::try_from(items.len()).map_err(|_| {
                    OpenWireError::decode(DecodeErrorKind::SizeOverflow, 0)
                })?)?;
                for item in items {
                    item.marshal(w)?;
                }
            }
            Self::Map(map) => marshal_map(map, w)?,
        }
        Ok(())
    }

    pub fn unmarshal(r: &mut dyn Read) -> OpenWireResult<Self> {
        let tag = Tag::from_u8(r.read_u8()?)?;
        Ok(match tag {
            Tag::Null => Self::Null,
            Tag::Bool => Self::Bool(r.read_u8()? != 0),
            Tag::Byte => Self::Byte(r.read_u8()?),
            Tag::Char => {
                let raw = r.read_u16::<BigEndian>()?;
                Self::Char(char::from_u32(u32::from(raw)).unwrap_or('\u{FFFD}'))
            }
            Tag::Short => Self::Short(r.read_i16::<BigEndian>()?),
            Tag::Int => Self::Int(r.read_i32::<BigEndian>()?),
            Tag::Long => Self::Long(r.read_i64::<BigEndian>()?),
            Tag::Float => Self::Float(r.read_f32::<BigEndian>()?),
            Tag::Double => Self::Double(r.read_f64::<BigEndian>()?),
            Tag::String => {
                let len = r.read_u16::<BigEndian>()? as usize;
                Self::String(read_modified_utf8(r, len)?)
            }
            Tag::BigString => {
                let len = r.read_i32::<BigEndian>()?;
                let len = usize::try_from(len).map_err(|_| {
                    OpenWireError::decode(DecodeErrorKind::SizeOverflow, 0)
                })?;
                Self::String(read_modified_utf8(r, len)?)
            }
            Tag::Bytes => {
                let len = r.read_i32::<BigEndian>()?;
                let len = usize::try_from(len).map_err(|_| {
                    OpenWireError::decode(DecodeErrorKind::SizeOverflow, 0)
                })?;
                let mut buf = vec![0_u8; len];
                r.read_exact(&mut buf)?;
                Self::Bytes(buf)
            }
            Tag::List => {
                let count = r.read_i32::<BigEndian>()?;
                let count = usize::try_from(count).map_err(|_| {
                    OpenWireError::decode(DecodeErrorKind::SizeOverflow, 0)
                })?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(Self::unmarshal(r)?);
                }
                Self::List(items)
            }
            Tag::Map => Self::Map(unmarshal_map(r)?),
        })
    }
}

fn marshal_string(s: &str, w: &mut dyn Write) -> OpenWireResult<()> {
    let bytes = modified_utf8::encode(s);
    if bytes.len() < modified_utf8::STRING_LENGTH_LIMIT {
        w.write_u16::<BigEndian>(bytes.len() as u16)?;
    } else {
        w.write_i32::<BigEndian>(i32::try_from(bytes.len()).map_err(|_| {
            OpenWireError::decode(DecodeErrorKind::SizeOverflow, 0)
        })?)?;
    }
    w.write_all(&bytes)?;
    Ok(())
}

fn read_modified_utf8(r: &mut dyn Read, byte_len: usize) -> OpenWireResult<String> {
    let mut buf = vec![0_u8; byte_len];
    r.read_exact(&mut buf)?;
    modified_utf8::decode(&buf, false)
}

/// `i32 entryCount`, then per entry `u16 keyLen` + key bytes (modified UTF-8),
/// `u8 typeTag`, then the value (spec.md §4.1 "Primitive-map format").
pub fn marshal_map(map: &PrimitiveMap, w: &mut dyn Write) -> OpenWireResult<()> {
    w.write_i32::<BigEndian>(i32::try_from(map.len()).map_err(|_| {
        OpenWireError::decode(DecodeErrorKind::SizeOverflow, 0)
    })?)?;
    for (key, value) in map {
        let key_bytes = modified_utf8::encode(key);
        w.write_u16::<BigEndian>(u16::try_from(key_bytes.len()).map_err(|_| {
            OpenWireError::decode(DecodeErrorKind::SizeOverflow, 0)
        })?)?;
        w.write_all(&key_bytes)?;
        value.marshal(w)?;
    }
    Ok(())
}

pub fn unmarshal_map(r: &mut dyn Read) -> OpenWireResult<PrimitiveMap> {
    let count = r.read_i32::<BigEndian>()?;
    let count = usize::try_from(count).map_err(|_| {
        OpenWireError::decode(DecodeErrorKind::SizeOverflow, 0)
    })?;
    let mut map = PrimitiveMap::new();
    for _ in 0..count {
        let key_len = r.read_u16::<BigEndian>()? as usize;
        let key = read_modified_utf8(r, key_len)?;
        let value = PrimitiveValue::unmarshal(r)?;
        map.insert(key, value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn round_trip(value: &PrimitiveValue) -> PrimitiveValue {
        let mut buf = Vec::new();
        value.marshal(&mut buf).unwrap();
        let mut cursor = Cursor::new(buf);
        PrimitiveValue::unmarshal(&mut cursor).unwrap()
    }

    #[test]
    fn scalar_values_round_trip() {
        for v in [
            PrimitiveValue::Null,
            PrimitiveValue::Bool(true),
            PrimitiveValue::Byte(200),
            PrimitiveValue::Char('Z'),
            PrimitiveValue::Short(-7),
            PrimitiveValue::Int(123_456),
            PrimitiveValue::Long(-1),
            PrimitiveValue::Float(1.5),
            PrimitiveValue::Double(2.25),
            PrimitiveValue::String("hello\u{0}world".to_string()),
            PrimitiveValue::Bytes(vec![1, 2, 3]),
        ] {
            assert_eq!(round_trip(&v), v);
        }
    }

    #[test]
    fn nested_list_and_map_round_trip() {
        let mut inner = PrimitiveMap::new();
        inner.insert("a".to_string(), PrimitiveValue::Int(1));
        let value = PrimitiveValue::List(vec![
            PrimitiveValue::Map(inner),
            PrimitiveValue::String("x".to_string()),
        ]);
        assert_eq!(round_trip(&value), value);
    }

    #[test]
    fn big_string_selected_at_32768() {
        let s = "x".repeat(32_768);
        let value = PrimitiveValue::String(s);
        let mut buf = Vec::new();
        value.marshal(&mut buf).unwrap();
        assert_eq!(buf[0], Tag::BigString as u8);
    }
}
