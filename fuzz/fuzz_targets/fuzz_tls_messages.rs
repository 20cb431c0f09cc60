#![no_main]

use libfuzzer_sys::fuzz_target;
use milli_tls::handshake::messages;
use milli_tls::handshake::HandshakeType;

fuzz_target!(|data: &[u8]| {
    // Fuzz all TLS 1.2 handshake parsers: should never panic on any input.

    if let Ok((msg_type, body_len)) = messages::read_handshake_header(data) {
        if data.len() >= 4 + body_len {
            let body = &data[4..4 + body_len];

            match HandshakeType::from_u8(msg_type) {
                Some(HandshakeType::ClientHello) => {
                    if let Ok(hello) = messages::parse_client_hello(body) {
                        for suite in hello.cipher_suites() {
                            let _ = suite;
                        }
                    }
                }
                Some(HandshakeType::ServerHello) => {
                    let _ = messages::parse_server_hello(body);
                }
                Some(HandshakeType::Certificate) => {
                    if let Ok(chain) = messages::parse_certificate(body) {
                        for cert in chain.iter() {
                            let _ = cert;
                        }
                    }
                }
                Some(HandshakeType::ServerHelloDone) => {
                    let _ = messages::parse_server_hello_done(body);
                }
                Some(HandshakeType::Finished) => {
                    let _ = messages::parse_finished(body);
                }
                _ => {}
            }
        }
    }

    // Also try each parser directly on the raw data
    let _ = messages::parse_client_hello(data);
    let _ = messages::parse_server_hello(data);
    let _ = messages::parse_certificate(data);
    let _ = messages::parse_finished(data);
});
