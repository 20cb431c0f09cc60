#![no_main]

use libfuzzer_sys::fuzz_target;
use milli_tls::record;

fuzz_target!(|data: &[u8]| {
    // Record framing must never panic and never report a length past the input.
    if let Ok(header) = record::decode_record_header(data) {
        let mut out = [0u8; record::RECORD_HEADER_LEN];
        let _ = header.encode(&mut out);
        assert_eq!(&out[..], &data[..record::RECORD_HEADER_LEN]);
    }
    if let Ok(Some(total)) = record::complete_record_len(data) {
        assert!(total <= data.len());
    }
});
