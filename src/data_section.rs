//! Data section decoding
//!
//! Decodes the self-describing MaxMind DB data format used for both the
//! records referenced by the search tree and the metadata block.
//!
//! # Supported Types
//!
//! - **Pointer**: reference to another data item, resolved transparently
//! - **String**: UTF-8 text data (invalid sequences are replaced)
//! - **Double**: 64-bit floating point (IEEE 754)
//! - **Bytes**: raw byte arrays
//! - **Uint16** / **Uint32** / **Uint64** / **Uint128**: unsigned integers
//! - **Map**: ordered key-value pairs (string keys)
//! - **Int32**: signed 32-bit integers
//! - **Array**: ordered lists of values
//! - **Bool**: boolean values
//! - **Float**: 32-bit floating point (IEEE 754)
//!
//! # Format
//!
//! Every value starts with a control byte: 3 bits of type and 5 bits of
//! size. Type 0 escapes to an extended type stored in the following byte
//! (real type = byte + 7). Sizes 29, 30 and 31 are followed by 1, 2 or 3
//! bytes that extend the size field.
//!
//! See: https://maxmind.github.io/MaxMind-DB/

use crate::byte_source::{read_bytes, read_u8};
use crate::endian::{be_f32, be_f64, be_i32, be_u32, be_uint};
use crate::error::{GeoIpError, Result};
use crate::mmdb::types::DATA_SECTION_SEPARATOR_SIZE;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::collections::HashMap;
use std::fmt;

/// Default ceiling on nested maps, arrays and pointer hops
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Floor for the number of values one `decode` call may produce. The
/// actual budget is the larger of this and the buffer length, so pointer
/// fan-out can't make a decode cost more than linear in the file size.
pub const MIN_VALUE_BUDGET: usize = 4096;

/// Extra bias added to pointers of each byte width (1..=4)
const POINTER_BIAS: [usize; 4] = [0, 2048, 526_336, 0];

/// Control-byte type code that escapes to an extended type
const EXTENDED_TYPE: u16 = 0;

/// Decodable wire types.
///
/// Code 0 (extended escape) and the reserved codes 12 and 13 never decode
/// to a value, so they have no variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DataType {
    /// Pointer into the data section
    Pointer = 1,
    /// UTF-8 string
    String = 2,
    /// 64-bit float
    Double = 3,
    /// Opaque bytes
    Bytes = 4,
    /// Unsigned 16-bit integer
    Uint16 = 5,
    /// Unsigned 32-bit integer
    Uint32 = 6,
    /// Map with string keys
    Map = 7,
    /// Signed 32-bit integer
    Int32 = 8,
    /// Unsigned 64-bit integer
    Uint64 = 9,
    /// Unsigned 128-bit integer
    Uint128 = 10,
    /// Array
    Array = 11,
    /// Boolean
    Bool = 14,
    /// 32-bit float
    Float = 15,
}

impl DataType {
    /// Map a numeric type code to a decodable type.
    ///
    /// The reserved codes (extended escape, container, end marker) and
    /// anything above 15 are rejected.
    pub fn from_id(id: u16) -> Result<Self> {
        let data_type = match id {
            1 => DataType::Pointer,
            2 => DataType::String,
            3 => DataType::Double,
            4 => DataType::Bytes,
            5 => DataType::Uint16,
            6 => DataType::Uint32,
            7 => DataType::Map,
            8 => DataType::Int32,
            9 => DataType::Uint64,
            10 => DataType::Uint128,
            11 => DataType::Array,
            14 => DataType::Bool,
            15 => DataType::Float,
            _ => {
                return Err(GeoIpError::Format(format!(
                    "unrecognized data type code {}",
                    id
                )))
            }
        };
        Ok(data_type)
    }
}

/// Ordered map of decoded key/value pairs.
///
/// Keeps the order keys appear in the file. Inserting an existing key
/// overwrites its value in place, so the last occurrence wins.
#[derive(Clone, Default)]
pub struct DataMap {
    entries: Vec<(String, DataValue)>,
    // key -> position in `entries`
    index: HashMap<String, usize>,
}

impl DataMap {
    /// Empty map
    pub fn new() -> Self {
        Self::default()
    }

    fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Insert or overwrite `key`
    pub fn insert(&mut self, key: String, value: DataValue) {
        match self.index.get(&key) {
            Some(&pos) => self.entries[pos].1 = value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    /// Value stored under `key`
    pub fn get(&self, key: &str) -> Option<&DataValue> {
        self.index.get(key).map(|&pos| &self.entries[pos].1)
    }

    /// True if `key` is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the map has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in file order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Entries in file order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DataValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Debug for DataMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl PartialEq for DataMap {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl FromIterator<(String, DataValue)> for DataMap {
    fn from_iter<I: IntoIterator<Item = (String, DataValue)>>(iter: I) -> Self {
        let mut map = DataMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl Serialize for DataMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (k, v) in self.iter() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl IntoIterator for DataMap {
    type Item = (String, DataValue);
    type IntoIter = std::vec::IntoIter<(String, DataValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// A decoded data section value.
///
/// Pointers never appear here: the decoder resolves them to the value they
/// reference.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    /// UTF-8 string
    String(String),
    /// IEEE 754 double precision float
    Double(f64),
    /// Raw byte array
    Bytes(Vec<u8>),
    /// Unsigned 16-bit integer
    Uint16(u16),
    /// Unsigned 32-bit integer
    Uint32(u32),
    /// Key-value map in file order
    Map(DataMap),
    /// Signed 32-bit integer
    Int32(i32),
    /// Unsigned 64-bit integer
    Uint64(u64),
    /// Unsigned 128-bit integer
    Uint128(u128),
    /// Array of values
    Array(Vec<DataValue>),
    /// Boolean value
    Bool(bool),
    /// IEEE 754 single precision float
    Float(f32),
}

impl DataValue {
    /// Borrow as a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DataValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow as a map
    pub fn as_map(&self) -> Option<&DataMap> {
        match self {
            DataValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Borrow as an array
    pub fn as_array(&self) -> Option<&[DataValue]> {
        match self {
            DataValue::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Any unsigned integer that fits in a `u64`
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            DataValue::Uint16(n) => Some(u64::from(*n)),
            DataValue::Uint32(n) => Some(u64::from(*n)),
            DataValue::Uint64(n) => Some(*n),
            DataValue::Uint128(n) => u64::try_from(*n).ok(),
            _ => None,
        }
    }

    /// Any numeric value widened to `f64`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DataValue::Double(d) => Some(*d),
            DataValue::Float(f) => Some(f64::from(*f)),
            DataValue::Int32(n) => Some(f64::from(*n)),
            DataValue::Uint16(n) => Some(f64::from(*n)),
            DataValue::Uint32(n) => Some(f64::from(*n)),
            DataValue::Uint64(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Map lookup; `None` if this is not a map or the key is absent
    pub fn get(&self, key: &str) -> Option<&DataValue> {
        self.as_map().and_then(|m| m.get(key))
    }
}

impl Serialize for DataValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            DataValue::String(s) => serializer.serialize_str(s),
            DataValue::Double(d) => serializer.serialize_f64(*d),
            DataValue::Bytes(b) => {
                let mut seq = serializer.serialize_seq(Some(b.len()))?;
                for byte in b {
                    seq.serialize_element(byte)?;
                }
                seq.end()
            }
            DataValue::Uint16(n) => serializer.serialize_u16(*n),
            DataValue::Uint32(n) => serializer.serialize_u32(*n),
            DataValue::Map(m) => m.serialize(serializer),
            DataValue::Int32(n) => serializer.serialize_i32(*n),
            DataValue::Uint64(n) => serializer.serialize_u64(*n),
            // JSON consumers can't hold 128-bit integers
            DataValue::Uint128(n) => serializer.serialize_str(&n.to_string()),
            DataValue::Array(a) => {
                let mut seq = serializer.serialize_seq(Some(a.len()))?;
                for item in a {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            DataValue::Bool(b) => serializer.serialize_bool(*b),
            DataValue::Float(f) => serializer.serialize_f32(*f),
        }
    }
}

/// Data section decoder
///
/// Decodes values out of a whole-file buffer. `pointer_base` is the offset
/// pointers are relative to (before the 16-byte separator is added): the end
/// of the search tree for record data, the end of the metadata marker for
/// metadata.
#[derive(Debug, Clone, Copy)]
pub struct DataDecoder<'a> {
    buffer: &'a [u8],
    pointer_base: usize,
    max_depth: usize,
}

impl<'a> DataDecoder<'a> {
    /// Create a decoder with the default depth ceiling
    pub fn new(buffer: &'a [u8], pointer_base: usize) -> Self {
        Self {
            buffer,
            pointer_base,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Override the nesting/pointer-hop ceiling
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Decode the value at `offset`
    pub fn decode(&self, offset: usize) -> Result<DataValue> {
        self.read(offset).map(|(value, _)| value)
    }

    /// Decode the value at `offset`, returning it with the offset just past
    /// its encoding. A pointer only advances past its own bytes.
    pub fn read(&self, offset: usize) -> Result<(DataValue, usize)> {
        let mut budget = self.value_budget();
        self.read_at(offset, 0, &mut budget)
    }

    /// Values a single `decode`/`read` may produce before failing
    pub fn value_budget(&self) -> usize {
        self.buffer.len().max(MIN_VALUE_BUDGET)
    }

    fn read_at(&self, offset: usize, depth: usize, budget: &mut usize) -> Result<(DataValue, usize)> {
        if depth > self.max_depth {
            return Err(GeoIpError::Format(format!(
                "maximum decode depth {} exceeded at offset {}",
                self.max_depth, offset
            )));
        }
        if *budget == 0 {
            return Err(GeoIpError::Format(format!(
                "value budget of {} exhausted at offset {}",
                self.value_budget(),
                offset
            )));
        }
        *budget -= 1;

        let ctrl = read_u8(self.buffer, offset)?;
        let mut cursor = offset + 1;
        let mut type_id = u16::from(ctrl >> 5);
        let mut size = usize::from(ctrl & 0x1F);

        if type_id == EXTENDED_TYPE {
            let ext = read_u8(self.buffer, cursor)?;
            cursor += 1;
            type_id = u16::from(ext) + 7;
            // An escape to type 7 would alias the plain map code
            if type_id == DataType::Map as u16 {
                return Err(GeoIpError::Format(format!(
                    "invalid extended type byte 0 at offset {}",
                    offset
                )));
            }
        }
        let data_type = DataType::from_id(type_id).map_err(|e| {
            log::warn!("Rejecting value at offset {}: {}", offset, e);
            e
        })?;

        if data_type != DataType::Pointer && size >= 29 {
            let extra = size - 28;
            let bytes = read_bytes(self.buffer, cursor, extra)?;
            cursor += extra;
            size = match size {
                29 => 29 + usize::from(bytes[0]),
                30 => 285 + be_u32(bytes) as usize,
                _ => 65_821 + be_u32(bytes) as usize,
            };
        }

        match data_type {
            DataType::Pointer => {
                let (target, next) = self.pointer_target(size, cursor)?;
                let (value, _) = self.read_at(target, depth + 1, budget)?;
                Ok((value, next))
            }
            DataType::String => {
                let bytes = read_bytes(self.buffer, cursor, size)?;
                let s = String::from_utf8_lossy(bytes).into_owned();
                Ok((DataValue::String(s), cursor + size))
            }
            DataType::Double => {
                let bytes = self.fixed::<8>(cursor, size, "double")?;
                Ok((DataValue::Double(be_f64(bytes)), cursor + 8))
            }
            DataType::Bytes => {
                let bytes = read_bytes(self.buffer, cursor, size)?;
                Ok((DataValue::Bytes(bytes.to_vec()), cursor + size))
            }
            DataType::Uint16 => {
                let n = self.uint(cursor, size, 2, "uint16")?;
                Ok((DataValue::Uint16(n as u16), cursor + size))
            }
            DataType::Uint32 => {
                let n = self.uint(cursor, size, 4, "uint32")?;
                Ok((DataValue::Uint32(n as u32), cursor + size))
            }
            DataType::Uint64 => {
                let n = self.uint(cursor, size, 8, "uint64")?;
                Ok((DataValue::Uint64(n as u64), cursor + size))
            }
            DataType::Uint128 => {
                let n = self.uint(cursor, size, 16, "uint128")?;
                Ok((DataValue::Uint128(n), cursor + size))
            }
            DataType::Int32 => {
                if size > 4 {
                    return Err(self.width_error("int32", size, cursor));
                }
                let bytes = read_bytes(self.buffer, cursor, size)?;
                Ok((DataValue::Int32(be_i32(bytes)), cursor + size))
            }
            DataType::Map => self.read_map(size, cursor, depth, budget),
            DataType::Array => self.read_array(size, cursor, depth, budget),
            DataType::Bool => Ok((DataValue::Bool(size != 0), cursor)),
            DataType::Float => {
                let bytes = self.fixed::<4>(cursor, size, "float")?;
                Ok((DataValue::Float(be_f32(bytes)), cursor + 4))
            }
        }
    }

    /// Resolve a pointer whose control-byte size field is `size` and whose
    /// payload starts at `cursor`. Returns the absolute target offset and the
    /// offset just past the pointer's own bytes.
    pub(crate) fn pointer_target(&self, size: usize, cursor: usize) -> Result<(usize, usize)> {
        let width = ((size >> 3) & 0x3) + 1;
        let bytes = read_bytes(self.buffer, cursor, width)?;
        let raw = if width == 4 {
            be_u32(bytes) as usize
        } else {
            ((size & 0x7) << (8 * width)) | be_u32(bytes) as usize
        };

        let target = raw
            .checked_add(self.pointer_base)
            .and_then(|t| t.checked_add(DATA_SECTION_SEPARATOR_SIZE))
            .and_then(|t| t.checked_add(POINTER_BIAS[width - 1]))
            .ok_or_else(|| {
                GeoIpError::Format(format!("pointer at offset {} overflows", cursor))
            })?;

        Ok((target, cursor + width))
    }

    fn read_map(
        &self,
        count: usize,
        mut cursor: usize,
        depth: usize,
        budget: &mut usize,
    ) -> Result<(DataValue, usize)> {
        // Don't trust the count for preallocation
        let mut map = DataMap::with_capacity(count.min(64));
        for _ in 0..count {
            let (key, next) = self.read_at(cursor, depth + 1, budget)?;
            let key = match key {
                DataValue::String(s) => s,
                other => {
                    return Err(GeoIpError::Format(format!(
                        "map key at offset {} is not a string: {:?}",
                        cursor, other
                    )))
                }
            };
            let (value, next) = self.read_at(next, depth + 1, budget)?;
            map.insert(key, value);
            cursor = next;
        }
        Ok((DataValue::Map(map), cursor))
    }

    fn read_array(
        &self,
        count: usize,
        mut cursor: usize,
        depth: usize,
        budget: &mut usize,
    ) -> Result<(DataValue, usize)> {
        let mut items = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            let (value, next) = self.read_at(cursor, depth + 1, budget)?;
            items.push(value);
            cursor = next;
        }
        Ok((DataValue::Array(items), cursor))
    }

    fn uint(&self, cursor: usize, size: usize, max: usize, name: &str) -> Result<u128> {
        if size > max {
            return Err(self.width_error(name, size, cursor));
        }
        Ok(be_uint(read_bytes(self.buffer, cursor, size)?))
    }

    fn fixed<const N: usize>(&self, cursor: usize, size: usize, name: &str) -> Result<[u8; N]> {
        if size != N {
            return Err(GeoIpError::Format(format!(
                "{} at offset {} has size {}, expected {}",
                name, cursor, size, N
            )));
        }
        let mut out = [0u8; N];
        out.copy_from_slice(read_bytes(self.buffer, cursor, N)?);
        Ok(out)
    }

    fn width_error(&self, name: &str, size: usize, cursor: usize) -> GeoIpError {
        GeoIpError::Format(format!(
            "{} at offset {} is {} bytes wide",
            name, cursor, size
        ))
    }
}
