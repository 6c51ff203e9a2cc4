#![no_main]
use libfuzzer_sys::fuzz_target;
use std::sync::OnceLock;

const METADATA_MARKER: &[u8] = b"\xAB\xCD\xEFMaxMind.com";

fn push_str(buf: &mut Vec<u8>, s: &str) {
    buf.push(0x40 | s.len() as u8);
    buf.extend_from_slice(s.as_bytes());
}

/// Two-node IPv6 tree: ::/1 -> {"country": {"iso_code": "US"}},
/// 8000::/2 -> the same record through a pointer, c000::/2 -> nothing
fn database() -> &'static geoip::MaxMindDatabase {
    static DB: OnceLock<geoip::MaxMindDatabase> = OnceLock::new();
    DB.get_or_init(|| {
        let node_count = 2u32;
        let data_record = node_count + 16;
        let pointer_record = data_record + 24;

        let mut buf = Vec::new();
        for record in [data_record, 1, pointer_record, node_count] {
            buf.extend_from_slice(&record.to_be_bytes()[1..]);
        }
        buf.extend_from_slice(&[0u8; 16]);
        buf.push(0xE1);
        push_str(&mut buf, "country");
        buf.push(0xE1);
        push_str(&mut buf, "iso_code");
        push_str(&mut buf, "US");
        // Pad to offset 24, then a pointer back to offset 0
        buf.resize(buf.len() + 2, 0xE0);
        buf.extend_from_slice(&[0x20, 0x00]);

        buf.extend_from_slice(METADATA_MARKER);
        buf.push(0xE3);
        for (key, value) in [("node_count", 2u16), ("record_size", 24), ("ip_version", 6)] {
            push_str(&mut buf, key);
            buf.push(0xA2);
            buf.extend_from_slice(&value.to_be_bytes());
        }
        match geoip::MaxMindDatabase::from_bytes(buf) {
            Ok(db) => db,
            Err(e) => panic!("fuzz database is invalid: {}", e),
        }
    })
}

fuzz_target!(|data: &[u8]| {
    let db = database();

    if let Ok(query) = std::str::from_utf8(data) {
        let _ = db.lookup(query);
    }

    // Parsed addresses must always resolve to a result, never an error
    if data.len() == 4 {
        let addr = std::net::IpAddr::from([data[0], data[1], data[2], data[3]]);
        assert!(db.lookup_addr(addr).is_ok());
    } else if data.len() == 16 {
        let mut octets = [0u8; 16];
        octets.copy_from_slice(data);
        assert!(db.lookup_addr(std::net::IpAddr::from(octets)).is_ok());
    }
});
