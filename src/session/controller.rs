//! Handshake driver: pulls records from the transport and routes each
//! handshake message by (role, state, message type).

use rand_core::{CryptoRng, RngCore};

use super::{Outbound, Session};
use crate::buf::BufExt;
use crate::config::HANDSHAKE_BUF_SIZE;
use crate::crypto::ct_eq;
use crate::error::Error;
use crate::handshake::messages::{parse_finished, read_handshake_header, HANDSHAKE_HEADER_LEN};
use crate::handshake::transcript::MAX_TRANSCRIPT_HASH_LEN;
use crate::handshake::{HandshakeState, HandshakeStatus, HandshakeType, Role};
use crate::key_material::VERIFY_DATA_LEN;
use crate::packet::WaitOption;
use crate::record::RecordProtection;
use crate::transport::Transport;

impl<'a, R: RngCore + CryptoRng> Session<'a, R> {
    /// Advance the handshake as far as the transport allows.
    ///
    /// Returns [`HandshakeStatus::Continue`] when `wait` is
    /// [`WaitOption::NoWait`] and nothing is pending. Any other error is
    /// fatal: a best-effort alert goes to the peer and the session moves to
    /// [`HandshakeState::Failed`].
    pub fn process_handshake<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        wait: WaitOption,
    ) -> Result<HandshakeStatus, Error> {
        if self.state == HandshakeState::Failed {
            return Err(Error::InvalidState);
        }
        match self.drive_handshake(transport, wait) {
            Ok(status) => Ok(status),
            Err(Error::NoPacket) if wait == WaitOption::NoWait => Ok(HandshakeStatus::Continue),
            Err(e) => Err(self.abort(transport, e)),
        }
    }

    fn drive_handshake<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        wait: WaitOption,
    ) -> Result<HandshakeStatus, Error> {
        self.flush(transport, wait)?;
        self.complete_if_flushed();
        if self.role == Role::Client && self.state == HandshakeState::Idle {
            self.start_client()?;
            self.flush(transport, wait)?;
        }
        loop {
            while self.state != HandshakeState::HandshakeFinished {
                if !self.process_next_record()? {
                    break;
                }
                self.flush(transport, wait)?;
                self.complete_if_flushed();
            }
            if self.state == HandshakeState::HandshakeFinished {
                tracing::debug!(
                    role = ?self.role,
                    suite = self.ciphersuite.map(|s| s.name),
                    "handshake complete"
                );
                return Ok(HandshakeStatus::Complete);
            }
            let packet = transport.receive(wait)?;
            self.absorb(transport, packet)?;
        }
    }

    /// Enter `HandshakeFinished` once the peer's Finished is verified and
    /// our whole final flight, ChangeCipherSpec included, has been sent.
    fn complete_if_flushed(&mut self) {
        if self.peer_finished
            && self.outbound.is_empty()
            && self.local_session_active
            && self.state != HandshakeState::HandshakeFinished
        {
            self.set_state(HandshakeState::HandshakeFinished);
        }
    }

    /// Buffer handshake bytes and handle every complete message in them.
    pub(super) fn on_handshake_data(&mut self, data: &[u8]) -> Result<(), Error> {
        if self.state == HandshakeState::HandshakeFinished {
            // Renegotiation is not supported.
            return Err(Error::UnexpectedMessage);
        }
        self.hs_buf.buf_extend_from_slice(data)?;
        loop {
            let buffered = self.hs_buf.buf_as_slice();
            if buffered.len() < HANDSHAKE_HEADER_LEN {
                return Ok(());
            }
            let (_, body_len) = read_handshake_header(buffered)?;
            let total = HANDSHAKE_HEADER_LEN + body_len;
            if total > HANDSHAKE_BUF_SIZE {
                return Err(Error::Decode);
            }
            if buffered.len() < total {
                return Ok(());
            }
            let mut messages = core::mem::take(&mut self.hs_buf);
            let result = self.handle_handshake_message(&messages.buf_as_slice()[..total]);
            messages.buf_drain_front(total);
            self.hs_buf = messages;
            result?;
        }
    }

    fn handle_handshake_message(&mut self, message: &[u8]) -> Result<(), Error> {
        let msg_type = HandshakeType::from_u8(message[0]).ok_or(Error::UnexpectedMessage)?;
        let body = &message[HANDSHAKE_HEADER_LEN..];
        tracing::debug!(role = ?self.role, state = ?self.state, ?msg_type, len = body.len(), "handshake message");

        let psk = self.is_psk_suite();
        if msg_type == HandshakeType::Finished {
            return match (self.role, self.state) {
                (Role::Client, HandshakeState::ClientFinishedSent)
                | (Role::Server, HandshakeState::ClientKeyExchangeReceived)
                    if self.remote_session_active && !self.peer_finished =>
                {
                    self.on_finished(message, body)
                }
                _ => Err(Error::UnexpectedMessage),
            };
        }

        self.transcript.update(message);
        use HandshakeState as S;
        use HandshakeType as M;
        match (self.role, self.state, msg_type) {
            (Role::Client, S::ClientHelloSent, M::ServerHello) => self.on_server_hello(body),
            (Role::Client, S::ServerHelloReceived, M::Certificate) if !psk => {
                self.on_server_certificate(body)
            }
            (Role::Client, S::ServerHelloReceived, M::ServerKeyExchange) if psk => {
                self.on_server_key_exchange(body)
            }
            (Role::Client, S::ServerCertificateReceived, M::ServerKeyExchange) => {
                self.on_server_key_exchange(body)
            }
            (Role::Client, S::ServerHelloReceived, M::ServerHelloDone) if psk => {
                self.on_server_hello_done(body)
            }
            (Role::Client, S::ServerKeyExchangeReceived, M::ServerHelloDone) => {
                self.on_server_hello_done(body)
            }
            (Role::Server, S::Idle, M::ClientHello) => self.on_client_hello(body),
            (Role::Server, S::ServerHelloDoneSent, M::ClientKeyExchange) => {
                self.on_client_key_exchange(body)
            }
            _ => Err(Error::UnexpectedMessage),
        }
    }

    /// Check the peer's Finished against the transcript so far, then add it.
    fn on_finished(&mut self, message: &[u8], body: &[u8]) -> Result<(), Error> {
        let received = parse_finished(body)?;
        let label: &[u8] = match self.role {
            Role::Client => b"server finished",
            Role::Server => b"client finished",
        };
        let expected = self.finished_verify_data(label)?;
        if !ct_eq(&expected, received) {
            tracing::debug!(role = ?self.role, "peer Finished does not match transcript");
            return Err(Error::DecryptError);
        }
        self.transcript.update(message);
        if self.role == Role::Server {
            self.queue(Outbound::ChangeCipherSpec)?;
            self.queue(Outbound::Finished)?;
        }
        self.peer_finished = true;
        Ok(())
    }

    pub(super) fn finished_verify_data(&self, label: &[u8]) -> Result<[u8; VERIFY_DATA_LEN], Error> {
        let suite = self.suite()?;
        let mut hash = [0u8; MAX_TRANSCRIPT_HASH_LEN];
        let n = self.transcript.current_hash(suite.prf_hash, &mut hash);
        self.key_material.verify_data(suite.prf_hash, label, &hash[..n])
    }

    /// Premaster, master secret and key block, then the pending record
    /// states for both directions.
    pub(super) fn establish_keys(&mut self) -> Result<(), Error> {
        let suite = self.suite()?;
        self.generate_premaster_secret(self.version.to_u16())?;
        self.key_material.derive_master_secret(suite.prf_hash)?;
        self.key_material.derive_key_block(suite)?;

        let write = self.key_material.keys(suite, self.role)?;
        self.pending_tx = Some(RecordProtection::new(suite, &write, self.version)?);
        let read = self.key_material.keys(suite, self.role.peer())?;
        self.pending_rx = Some(RecordProtection::new(suite, &read, self.version)?);
        tracing::debug!(role = ?self.role, suite = suite.name, "session keys derived");
        Ok(())
    }

    /// Build the queued message `message` into `out`. Returns 0 when the
    /// message turns out to be unnecessary.
    pub(super) fn write_handshake_message(&mut self, message: Outbound, out: &mut [u8]) -> Result<usize, Error> {
        match message {
            Outbound::ClientHello => self.write_client_hello(out),
            Outbound::ClientKeyExchange => self.write_client_key_exchange(out),
            Outbound::ServerHello => self.write_server_hello(out),
            Outbound::Certificate => self.write_certificate(out),
            Outbound::ServerKeyExchange => self.write_server_key_exchange_message(out),
            Outbound::ServerHelloDone => self.write_server_hello_done(out),
            Outbound::Finished => {
                let label: &[u8] = match self.role {
                    Role::Client => b"client finished",
                    Role::Server => b"server finished",
                };
                let verify_data = self.finished_verify_data(label)?;
                crate::handshake::messages::encode_finished(&verify_data, out)
            }
            Outbound::ChangeCipherSpec => Err(Error::InvalidState),
        }
    }
}
