//! MMDB Search Tree Traversal
//!
//! Implements binary search tree traversal for IP address lookups.
//! The tree uses a compact binary representation where each node contains
//! two records (left and right) that point to either:
//! - Another node (record < node_count, continue traversal)
//! - The "not found" sentinel (record == node_count)
//! - A data section offset (record > node_count)

use super::format::DatabaseMetadata;
use super::types::{IpVersion, RecordSize};
use crate::byte_source::read_bytes;
use crate::endian::{be_u32, PackedAddress};
use crate::error::{GeoIpError, Result};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

/// Number of leading zero bits that lead to IPv4 space in an IPv6 tree
const IPV4_SUBTREE_DEPTH: usize = 96;

/// Lazily computed IPv4 start node for IPv6 trees.
///
/// Concurrent first lookups may each compute the value; the walk is pure, so
/// they all store the same node and no lock is needed.
#[derive(Debug)]
pub struct Ipv4StartCache(AtomicU64);

impl Ipv4StartCache {
    const UNSET: u64 = u64::MAX;

    /// Empty cache
    pub fn new() -> Self {
        Self(AtomicU64::new(Self::UNSET))
    }

    /// Cached node, if computed
    pub fn get(&self) -> Option<u32> {
        match self.0.load(Ordering::Relaxed) {
            Self::UNSET => None,
            node => Some(node as u32),
        }
    }

    fn set(&self, node: u32) {
        self.0.store(u64::from(node), Ordering::Relaxed);
    }
}

impl Default for Ipv4StartCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Search tree for IP address lookups
///
/// Borrows the whole-file buffer; cheap to construct per lookup.
pub struct SearchTree<'a> {
    data: &'a [u8],
    metadata: &'a DatabaseMetadata,
    ipv4_start: &'a Ipv4StartCache,
}

impl<'a> SearchTree<'a> {
    /// Create a new search tree view
    pub fn new(
        data: &'a [u8],
        metadata: &'a DatabaseMetadata,
        ipv4_start: &'a Ipv4StartCache,
    ) -> Self {
        Self {
            data,
            metadata,
            ipv4_start,
        }
    }

    /// Look up an address, returning the absolute buffer offset of its data
    /// or `None` when the tree has no entry for it.
    pub fn lookup(&self, address: &PackedAddress) -> Result<Option<usize>> {
        let record = self.find_node(address)?;
        let node_count = self.metadata.node_count;

        if record == node_count {
            Ok(None)
        } else if record > node_count {
            // record - node_count already includes the 16-byte separator
            Ok(Some(
                (record - node_count) as usize + self.metadata.tree_size(),
            ))
        } else {
            Err(GeoIpError::Format(format!(
                "search tree still at node {} after {} bits",
                record,
                address.bit_len()
            )))
        }
    }

    /// Walk the tree for `address` and return the terminal record: a data
    /// pointer (> node_count), the sentinel (== node_count), or, for a tree
    /// deeper than the address, a node index.
    pub fn find_node(&self, address: &PackedAddress) -> Result<u32> {
        let node_count = self.metadata.node_count;
        if !address.is_v4() && self.metadata.ip_version == IpVersion::V4 {
            return Err(GeoIpError::Lookup(
                "cannot look up an IPv6 address in an IPv4-only database".to_string(),
            ));
        }

        let mut node = self.start_node(address)?;
        let bit_len = address.bit_len();
        let mut seen = HashSet::with_capacity(bit_len + 1);
        seen.insert(node);

        for i in 0..bit_len {
            if node >= node_count {
                break;
            }
            node = self.parse_record(node, address.bit(i))?;
            if node < node_count && !seen.insert(node) {
                log::warn!("Cycle in search tree at node {} (bit {})", node, i);
                return Err(GeoIpError::Lookup(format!(
                    "cycle detected in search tree at node {}",
                    node
                )));
            }
        }

        Ok(node)
    }

    fn start_node(&self, address: &PackedAddress) -> Result<u32> {
        if !address.is_v4() || self.metadata.ip_version == IpVersion::V4 {
            return Ok(0);
        }
        if let Some(node) = self.ipv4_start.get() {
            return Ok(node);
        }

        let node = self.find_ipv4_start_node()?;
        self.ipv4_start.set(node);
        Ok(node)
    }

    /// Follow 96 zero bits (the `::/96` prefix) from the root.
    fn find_ipv4_start_node(&self) -> Result<u32> {
        let mut node = 0u32;
        for _ in 0..IPV4_SUBTREE_DEPTH {
            if node >= self.metadata.node_count {
                break;
            }
            node = self.parse_record(node, 0)?;
        }
        log::trace!("IPv4 start node: {}", node);
        Ok(node)
    }

    /// Read the left (`bit == 0`) or right record of `node`.
    pub fn parse_record(&self, node: u32, bit: u8) -> Result<u32> {
        if node >= self.metadata.node_count {
            return Err(GeoIpError::Format(format!(
                "node index {} exceeds node count {}",
                node, self.metadata.node_count
            )));
        }

        let node_size = self.metadata.node_size();
        let node_offset = node as usize * node_size;
        let side = usize::from(bit & 1);

        match self.metadata.record_size {
            RecordSize::Bits24 => {
                let bytes = read_bytes(self.data, node_offset + side * 3, 3)?;
                Ok(be_u32(bytes))
            }
            RecordSize::Bits28 => {
                // [left 24 bits][left high nibble | right high nibble][right 24 bits]
                let bytes = read_bytes(self.data, node_offset, 7)?;
                let middle = u32::from(bytes[3]);
                if side == 0 {
                    Ok(((middle & 0xF0) << 20) | be_u32(&bytes[0..3]))
                } else {
                    Ok(((middle & 0x0F) << 24) | be_u32(&bytes[4..7]))
                }
            }
            RecordSize::Bits32 => {
                let bytes = read_bytes(self.data, node_offset + side * 4, 4)?;
                Ok(be_u32(bytes))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mmdb::types::METADATA_MARKER;

    /// Tree bytes + 16-byte separator + metadata for the given shape
    fn build(tree: &[u8], node_count: u16, record_size: u16, ip_version: u16) -> Vec<u8> {
        let mut buf = tree.to_vec();
        buf.extend_from_slice(&[0u8; 16]);
        buf.extend_from_slice(METADATA_MARKER);
        buf.push(0xE3);
        for (key, value) in [
            ("node_count", node_count),
            ("record_size", record_size),
            ("ip_version", ip_version),
        ] {
            buf.push(0x40 | key.len() as u8);
            buf.extend_from_slice(key.as_bytes());
            buf.push(0xA2);
            buf.extend_from_slice(&value.to_be_bytes());
        }
        buf
    }

    fn record24(n: u32) -> [u8; 3] {
        let b = n.to_be_bytes();
        [b[1], b[2], b[3]]
    }

    #[test]
    fn test_read_24bit_record() {
        let tree = [0x00, 0x00, 0x01, 0x00, 0x00, 0x02, 0, 0, 0, 0, 0, 0];
        let buf = build(&tree, 2, 24, 4);
        let md = DatabaseMetadata::from_buffer(&buf).unwrap();
        let cache = Ipv4StartCache::new();
        let tree = SearchTree::new(&buf, &md, &cache);

        assert_eq!(tree.parse_record(0, 0).unwrap(), 1);
        assert_eq!(tree.parse_record(0, 1).unwrap(), 2);
        assert!(tree.parse_record(2, 0).unwrap_err().is_format());
    }

    #[test]
    fn test_read_28bit_record() {
        // Left: 0x1000001, Right: 0x2000002
        let tree = [0x00, 0x00, 0x01, 0x12, 0x00, 0x00, 0x02];
        let buf = build(&tree, 1, 28, 4);
        let md = DatabaseMetadata::from_buffer(&buf).unwrap();
        let cache = Ipv4StartCache::new();
        let tree = SearchTree::new(&buf, &md, &cache);

        assert_eq!(tree.parse_record(0, 0).unwrap(), 0x1000001);
        assert_eq!(tree.parse_record(0, 1).unwrap(), 0x2000002);
    }

    #[test]
    fn test_read_32bit_record() {
        let tree = [0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x00, 0x00, 0x01];
        let buf = build(&tree, 1, 32, 4);
        let md = DatabaseMetadata::from_buffer(&buf).unwrap();
        let cache = Ipv4StartCache::new();
        let tree = SearchTree::new(&buf, &md, &cache);

        assert_eq!(tree.parse_record(0, 0).unwrap(), 0xDEADBEEF);
        assert_eq!(tree.parse_record(0, 1).unwrap(), 1);
    }

    #[test]
    fn test_single_node_sentinel() {
        let tree = [record24(1), record24(1)].concat();
        let buf = build(&tree, 1, 24, 4);
        let md = DatabaseMetadata::from_buffer(&buf).unwrap();
        let cache = Ipv4StartCache::new();
        let tree = SearchTree::new(&buf, &md, &cache);

        let addr = PackedAddress::V4([10, 0, 0, 1]);
        assert_eq!(tree.find_node(&addr).unwrap(), 1);
        assert_eq!(tree.lookup(&addr).unwrap(), None);
    }

    #[test]
    fn test_data_pointer_offset() {
        // node 0: left -> data record 1 + 16 + 5, right -> sentinel
        let tree = [record24(22), record24(1)].concat();
        let buf = build(&tree, 1, 24, 4);
        let md = DatabaseMetadata::from_buffer(&buf).unwrap();
        let cache = Ipv4StartCache::new();
        let tree = SearchTree::new(&buf, &md, &cache);

        // 0.x.x.x goes left
        let offset = tree.lookup(&PackedAddress::V4([0, 1, 2, 3])).unwrap();
        assert_eq!(offset, Some(6 + 16 + 5));
        // 128.x.x.x goes right
        assert_eq!(tree.lookup(&PackedAddress::V4([128, 0, 0, 0])).unwrap(), None);
    }

    #[test]
    fn test_cycle_detected() {
        // node 0 -> node 1 -> node 0 on every bit
        let tree = [record24(1), record24(1), record24(0), record24(0)].concat();
        let buf = build(&tree, 2, 24, 4);
        let md = DatabaseMetadata::from_buffer(&buf).unwrap();
        let cache = Ipv4StartCache::new();
        let tree = SearchTree::new(&buf, &md, &cache);

        let err = tree.find_node(&PackedAddress::V4([1, 2, 3, 4])).unwrap_err();
        assert!(err.is_lookup(), "expected lookup error, got {}", err);
    }

    #[test]
    fn test_self_loop_detected() {
        let tree = [record24(0), record24(0)].concat();
        let buf = build(&tree, 1, 24, 4);
        let md = DatabaseMetadata::from_buffer(&buf).unwrap();
        let cache = Ipv4StartCache::new();
        let tree = SearchTree::new(&buf, &md, &cache);

        assert!(tree.find_node(&PackedAddress::V4([0; 4])).unwrap_err().is_lookup());
    }

    #[test]
    fn test_ipv6_address_in_ipv4_tree() {
        let tree = [record24(1), record24(1)].concat();
        let buf = build(&tree, 1, 24, 4);
        let md = DatabaseMetadata::from_buffer(&buf).unwrap();
        let cache = Ipv4StartCache::new();
        let tree = SearchTree::new(&buf, &md, &cache);

        let err = tree.find_node(&PackedAddress::V6([0; 16])).unwrap_err();
        assert!(err.is_lookup());
        assert!(!err.is_invalid_ip());
    }

    #[test]
    fn test_ipv4_start_node_cached() {
        // A chain of 96 nodes following the left branch, node 96 is the
        // IPv4 root whose records are both the sentinel.
        let node_count = 97u32;
        let mut tree = Vec::new();
        for n in 0..96 {
            tree.extend(record24(n + 1));
            tree.extend(record24(node_count));
        }
        tree.extend(record24(node_count));
        tree.extend(record24(node_count));
        let buf = build(&tree, node_count as u16, 24, 6);
        let md = DatabaseMetadata::from_buffer(&buf).unwrap();
        let cache = Ipv4StartCache::new();
        let tree = SearchTree::new(&buf, &md, &cache);

        assert_eq!(cache.get(), None);
        assert_eq!(tree.lookup(&PackedAddress::V4([192, 0, 2, 1])).unwrap(), None);
        assert_eq!(cache.get(), Some(96));

        // Second lookup reuses the cached node
        assert_eq!(tree.find_node(&PackedAddress::V4([8, 8, 8, 8])).unwrap(), node_count);
        assert_eq!(cache.get(), Some(96));
    }
}
