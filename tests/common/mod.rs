//! Test-only MaxMind DB writer
//!
//! Builds small but well-formed mmdb files so the reader can be exercised
//! end to end without shipping binary fixtures.

#![allow(dead_code)]

use geoip::{DataMap, DataValue};
use std::io::Write;
use std::net::IpAddr;
use tempfile::NamedTempFile;

const METADATA_MARKER: &[u8] = b"\xAB\xCD\xEFMaxMind.com";

/// Encodes values in the mmdb data format
#[derive(Default)]
pub struct DataEncoder {
    buffer: Vec<u8>,
}

impl DataEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode a value and return its offset
    pub fn encode(&mut self, value: &DataValue) -> u32 {
        let offset = self.buffer.len() as u32;
        Self::encode_to_buffer(value, &mut self.buffer);
        offset
    }

    /// Encode a pointer to `target` and return the pointer's own offset
    pub fn pointer(&mut self, target: u32) -> u32 {
        let offset = self.buffer.len() as u32;
        Self::encode_pointer(target, &mut self.buffer);
        offset
    }

    /// Append bytes verbatim and return their offset
    pub fn raw(&mut self, bytes: &[u8]) -> u32 {
        let offset = self.buffer.len() as u32;
        self.buffer.extend_from_slice(bytes);
        offset
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    pub fn encode_to_buffer(value: &DataValue, buffer: &mut Vec<u8>) {
        match value {
            DataValue::String(s) => {
                Self::control(2, s.len(), buffer);
                buffer.extend_from_slice(s.as_bytes());
            }
            DataValue::Double(d) => {
                buffer.push(0x68);
                buffer.extend_from_slice(&d.to_be_bytes());
            }
            DataValue::Bytes(b) => {
                Self::control(4, b.len(), buffer);
                buffer.extend_from_slice(b);
            }
            DataValue::Uint16(n) => Self::uint(5, u128::from(*n), buffer),
            DataValue::Uint32(n) => Self::uint(6, u128::from(*n), buffer),
            DataValue::Map(m) => {
                Self::control(7, m.len(), buffer);
                for (key, value) in m.iter() {
                    Self::encode_to_buffer(&DataValue::String(key.to_string()), buffer);
                    Self::encode_to_buffer(value, buffer);
                }
            }
            DataValue::Int32(n) => {
                buffer.extend_from_slice(&[0x04, 0x01]);
                buffer.extend_from_slice(&n.to_be_bytes());
            }
            DataValue::Uint64(n) => Self::uint(9, u128::from(*n), buffer),
            DataValue::Uint128(n) => Self::uint(10, *n, buffer),
            DataValue::Array(a) => {
                Self::control(11, a.len(), buffer);
                for item in a {
                    Self::encode_to_buffer(item, buffer);
                }
            }
            DataValue::Bool(b) => Self::control(14, usize::from(*b), buffer),
            DataValue::Float(f) => {
                buffer.extend_from_slice(&[0x04, 0x08]);
                buffer.extend_from_slice(&f.to_be_bytes());
            }
        }
    }

    /// Unsigned integer with leading zero bytes stripped
    fn uint(type_id: u8, n: u128, buffer: &mut Vec<u8>) {
        let bytes = n.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        Self::control(type_id, 16 - skip, buffer);
        buffer.extend_from_slice(&bytes[skip..]);
    }

    fn encode_pointer(offset: u32, buffer: &mut Vec<u8>) {
        if offset < 0x800 {
            buffer.push(0x20 | ((offset >> 8) & 0x7) as u8);
            buffer.push(offset as u8);
        } else if offset < 0x80800 {
            let adjusted = offset - 0x800;
            buffer.push(0x28 | ((adjusted >> 16) & 0x7) as u8);
            buffer.extend_from_slice(&adjusted.to_be_bytes()[2..]);
        } else if offset < 0x8080800 {
            let adjusted = offset - 0x80800;
            buffer.push(0x30 | ((adjusted >> 24) & 0x7) as u8);
            buffer.extend_from_slice(&adjusted.to_be_bytes()[1..]);
        } else {
            buffer.push(0x38);
            buffer.extend_from_slice(&offset.to_be_bytes());
        }
    }

    /// Control byte(s) for `type_id` and `size`, escaping extended types
    fn control(type_id: u8, size: usize, buffer: &mut Vec<u8>) {
        let (first, ext) = if type_id > 7 {
            (0u8, Some(type_id - 7))
        } else {
            (type_id << 5, None)
        };
        let (size_bits, extra): (u8, Vec<u8>) = if size < 29 {
            (size as u8, vec![])
        } else if size < 29 + 256 {
            (29, vec![(size - 29) as u8])
        } else if size < 29 + 256 + 65536 {
            (30, ((size - 285) as u16).to_be_bytes().to_vec())
        } else {
            (31, ((size - 65821) as u32).to_be_bytes()[1..].to_vec())
        };
        buffer.push(first | size_bits);
        if let Some(ext) = ext {
            buffer.push(ext);
        }
        buffer.extend_from_slice(&extra);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Slot {
    Empty,
    Node(u32),
    Data(u32),
}

/// Builds an mmdb file from (network, record) pairs
pub struct MmdbWriter {
    ip_version: u16,
    record_size: u16,
    database_type: String,
    build_epoch: u64,
    nodes: Vec<[Slot; 2]>,
    data: DataEncoder,
}

impl MmdbWriter {
    pub fn new(ip_version: u16, record_size: u16) -> Self {
        Self {
            ip_version,
            record_size,
            database_type: "Test-City".to_string(),
            build_epoch: 1_700_000_000,
            nodes: vec![[Slot::Empty, Slot::Empty]],
            data: DataEncoder::new(),
        }
    }

    pub fn database_type(mut self, name: &str) -> Self {
        self.database_type = name.to_string();
        self
    }

    /// Direct access to the data section, e.g. to lay down pointers
    pub fn data(&mut self) -> &mut DataEncoder {
        &mut self.data
    }

    /// Insert `cidr` (e.g. "1.2.3.0/24") pointing at a freshly encoded `value`
    pub fn insert(&mut self, cidr: &str, value: &DataValue) {
        let offset = self.data.encode(value);
        self.insert_offset(cidr, offset);
    }

    /// Insert `cidr` pointing at an existing data section offset
    pub fn insert_offset(&mut self, cidr: &str, offset: u32) {
        let (bits, prefix_len) = self.network_bits(cidr);
        assert!(prefix_len > 0, "cannot insert a zero-length prefix");
        self.set_path(&bits[..prefix_len], Slot::Data(offset));
    }

    /// Point `::ffff:0:0/96` at the IPv4 subtree under `::/96`, the way
    /// MaxMind's own writer aliases IPv4-mapped addresses
    pub fn alias_ipv4_mapped(&mut self) {
        assert_eq!(self.ip_version, 6, "aliases only exist in IPv6 trees");
        let mut node = 0usize;
        for _ in 0..96 {
            node = match self.nodes[node][0] {
                Slot::Node(next) => next as usize,
                _ => panic!("no IPv4 subtree to alias"),
            };
        }
        let mut bits = vec![0u8; 80];
        bits.extend(vec![1u8; 16]);
        self.set_path(&bits, Slot::Node(node as u32));
    }

    fn set_path(&mut self, bits: &[u8], leaf: Slot) {
        let mut node = 0usize;
        for (i, &bit) in bits.iter().enumerate() {
            let side = usize::from(bit);
            if i + 1 == bits.len() {
                self.nodes[node][side] = leaf;
                break;
            }
            node = match self.nodes[node][side] {
                Slot::Node(next) => next as usize,
                other => {
                    // Split an existing leaf so both halves keep its data
                    let fill = match other {
                        Slot::Data(d) => Slot::Data(d),
                        _ => Slot::Empty,
                    };
                    self.nodes.push([fill, fill]);
                    let next = self.nodes.len() - 1;
                    self.nodes[node][side] = Slot::Node(next as u32);
                    next
                }
            };
        }
    }

    fn network_bits(&self, cidr: &str) -> (Vec<u8>, usize) {
        let (addr, len) = match cidr.split_once('/') {
            Some((a, l)) => (a, l.parse::<usize>().expect("prefix length")),
            None => (cidr, usize::MAX),
        };
        let addr: IpAddr = addr.parse().expect("network address");
        let (bytes, addr_bits, offset) = match (addr, self.ip_version) {
            (IpAddr::V4(v4), 4) => (v4.octets().to_vec(), 32, 0),
            // IPv4 networks live under ::/96 in an IPv6 tree
            (IpAddr::V4(v4), _) => {
                let mut b = vec![0u8; 12];
                b.extend_from_slice(&v4.octets());
                (b, 32, 96)
            }
            (IpAddr::V6(v6), 6) => (v6.octets().to_vec(), 128, 0),
            (IpAddr::V6(_), _) => panic!("IPv6 network in an IPv4 tree"),
        };
        let bits = bytes
            .iter()
            .flat_map(|b| (0..8).rev().map(move |i| (b >> i) & 1))
            .collect();
        (bits, offset + len.min(addr_bits))
    }

    pub fn node_count(&self) -> u32 {
        self.nodes.len() as u32
    }

    fn record_value(&self, slot: Slot) -> u32 {
        let node_count = self.node_count();
        match slot {
            Slot::Empty => node_count,
            Slot::Node(n) => n,
            Slot::Data(offset) => node_count + 16 + offset,
        }
    }

    /// Serialize the search tree alone
    pub fn tree_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for node in &self.nodes {
            let left = self.record_value(node[0]);
            let right = self.record_value(node[1]);
            push_node(&mut out, self.record_size, left, right);
        }
        out
    }

    fn metadata(&self) -> DataValue {
        map(vec![
            ("node_count", DataValue::Uint32(self.node_count())),
            ("record_size", DataValue::Uint16(self.record_size)),
            ("ip_version", DataValue::Uint16(self.ip_version)),
            ("database_type", string(&self.database_type)),
            ("build_epoch", DataValue::Uint64(self.build_epoch)),
            (
                "languages",
                DataValue::Array(vec![string("en"), string("de")]),
            ),
            (
                "description",
                map(vec![("en", string("Test database")), ("de", string("Testdatenbank"))]),
            ),
            ("binary_format_major_version", DataValue::Uint16(2)),
            ("binary_format_minor_version", DataValue::Uint16(0)),
        ])
    }

    /// The complete file
    pub fn build(self) -> Vec<u8> {
        let metadata = self.metadata();
        let mut out = self.tree_bytes();
        out.extend_from_slice(&[0u8; 16]);
        out.extend(self.data.into_bytes());
        out.extend_from_slice(METADATA_MARKER);
        DataEncoder::encode_to_buffer(&metadata, &mut out);
        out
    }
}

/// Append one node holding `left` and `right` records
pub fn push_node(out: &mut Vec<u8>, record_size: u16, left: u32, right: u32) {
    match record_size {
        24 => {
            out.extend_from_slice(&left.to_be_bytes()[1..]);
            out.extend_from_slice(&right.to_be_bytes()[1..]);
        }
        28 => {
            out.extend_from_slice(&left.to_be_bytes()[1..]);
            out.push((((left >> 24) & 0xF) << 4) as u8 | ((right >> 24) & 0xF) as u8);
            out.extend_from_slice(&right.to_be_bytes()[1..]);
        }
        32 => {
            out.extend_from_slice(&left.to_be_bytes());
            out.extend_from_slice(&right.to_be_bytes());
        }
        // Unsupported widths are written as 24-bit so only the metadata is wrong
        _ => push_node(out, 24, left, right),
    }
}

/// Assemble a file from hand-made parts
pub fn assemble(tree: &[u8], data: &[u8], metadata: &DataValue) -> Vec<u8> {
    let mut out = tree.to_vec();
    out.extend_from_slice(&[0u8; 16]);
    out.extend_from_slice(data);
    out.extend_from_slice(METADATA_MARKER);
    DataEncoder::encode_to_buffer(metadata, &mut out);
    out
}

/// Minimal metadata for hand-made trees
pub fn basic_metadata(node_count: u32, record_size: u16, ip_version: u16) -> DataValue {
    map(vec![
        ("node_count", DataValue::Uint32(node_count)),
        ("record_size", DataValue::Uint16(record_size)),
        ("ip_version", DataValue::Uint16(ip_version)),
    ])
}

pub fn string(s: &str) -> DataValue {
    DataValue::String(s.to_string())
}

pub fn map(pairs: Vec<(&str, DataValue)>) -> DataValue {
    DataValue::Map(
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<DataMap>(),
    )
}

/// `{"country": {"iso_code": code}}`
pub fn country(code: &str) -> DataValue {
    map(vec![("country", map(vec![("iso_code", string(code))]))])
}

/// A GeoLite2-City shaped record
pub fn city(country_code: &str, subdivision: &str, tz: &str, lat: f64, lon: f64) -> DataValue {
    map(vec![
        ("continent", map(vec![("code", string("EU"))])),
        ("country", map(vec![("iso_code", string(country_code))])),
        (
            "location",
            map(vec![
                ("latitude", DataValue::Double(lat)),
                ("longitude", DataValue::Double(lon)),
                ("time_zone", string(tz)),
            ]),
        ),
        (
            "subdivisions",
            DataValue::Array(vec![map(vec![("iso_code", string(subdivision))])]),
        ),
    ])
}

/// Route `log` output through the test harness
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Write bytes to a temporary file that lives as long as the handle
pub fn write_temp(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(bytes).expect("write temp file");
    file.flush().expect("flush temp file");
    file
}
