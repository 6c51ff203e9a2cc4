#![no_main]
use geoip::data_section::DataDecoder;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // First byte picks the pointer base and start offset
    let base = usize::from(data[0]) % data.len();
    let decoder = DataDecoder::new(data, base).with_max_depth(64);
    let mut offset = 1;
    while offset < data.len() {
        match decoder.read(offset) {
            Ok((_, next)) if next > offset => offset = next,
            _ => break,
        }
    }
});
