#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Garbage must be rejected with an error, never a panic
    if let Ok(db) = geoip::MaxMindDatabase::from_bytes(data.to_vec()) {
        let _ = db.lookup("1.2.3.4");
        let _ = db.lookup("2001:db8::1");
        let _ = db.get_info();
    }
});
