#![no_main]

use libfuzzer_sys::fuzz_target;
use milli_tls::config::MAX_DNS_NAME_LEN;
use milli_tls::handshake::extensions::{
    allows_ecdsa_p256_sha256, find_extension, parse_extensions, parse_sni_extension,
    parse_supported_groups, Extension, EXT_SERVER_NAME, EXT_SUPPORTED_GROUPS,
};

fuzz_target!(|data: &[u8]| {
    // As a whole extension block.
    if let Ok(exts) = parse_extensions(data) {
        let _ = parse_sni_extension(&exts);
        let _ = allows_ecdsa_p256_sha256(&exts);
        if let Some(groups) = find_extension(&exts, EXT_SUPPORTED_GROUPS) {
            let _ = parse_supported_groups(groups.data);
        }
    }

    // As the body of a server_name extension.
    let sni = [Extension { ext_type: EXT_SERVER_NAME, data }];
    if let Ok(name) = parse_sni_extension(&sni) {
        assert!(name.len() <= MAX_DNS_NAME_LEN);
    }
});
