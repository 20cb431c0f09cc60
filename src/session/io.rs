//! Record framing, protection and the outbound flight queue.

use core::ops::Range;

use rand_core::{CryptoRng, RngCore};
use zeroize::Zeroize;

use super::{Outbound, Session};
use crate::buf::BufExt;
use crate::config::MAX_FRAGMENT_LEN;
use crate::crypto::cipher::AES_BLOCK_LEN;
use crate::crypto::mac::MAX_MAC_LEN;
use crate::crypto::ct_eq;
use crate::error::Error;
use crate::handshake::alert::{decode_alert, encode_alert};
use crate::handshake::{AlertDescription, AlertLevel, HandshakeState};
use crate::packet::{Packet, WaitOption};
use crate::record::{
    complete_record_len, decode_record_header, encode_record_header, ContentType, RecordHeader,
    RECORD_HEADER_LEN,
};
use crate::transport::Transport;

impl<'a, R: RngCore + CryptoRng> Session<'a, R> {
    /// Bytes a sealed record adds after the plaintext.
    fn record_overhead(&self) -> usize {
        match &self.tx {
            None => 0,
            Some(tx) if tx.is_aead() => tx.cipher().tag_len(),
            Some(tx) => tx.mac_algorithm().output_len() + AES_BLOCK_LEN,
        }
    }

    /// Room for plaintext in a freshly framed record packet.
    fn plaintext_room(&self, packet: &Packet) -> usize {
        core::cmp::min(
            packet.remaining().saturating_sub(self.record_overhead()),
            MAX_FRAGMENT_LEN,
        )
    }

    /// Seal the payload of `packet` under the current write state and send it.
    /// The packet is released on failure.
    pub(super) fn seal_and_send<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        content_type: ContentType,
        mut packet: Packet,
        wait: WaitOption,
    ) -> Result<(), Error> {
        if let Err(e) = self.seal_record(content_type, &mut packet) {
            transport.release(packet);
            return Err(e);
        }
        transport.send(packet, wait)
    }

    fn seal_record(&mut self, content_type: ContentType, packet: &mut Packet) -> Result<(), Error> {
        let payload_len = packet.len() - packet.payload_offset();
        match self.tx.as_ref().map(|tx| tx.is_aead()) {
            None => {
                encode_record_header(
                    content_type,
                    self.version.to_u16(),
                    payload_len as u16,
                    packet.header_mut(),
                )?;
                Ok(())
            }
            Some(true) => self
                .tx
                .as_mut()
                .ok_or(Error::InvalidState)?
                .seal_aead(content_type, packet),
            Some(false) => self.seal_cbc_record(content_type, packet, payload_len),
        }
    }

    fn seal_cbc_record(
        &mut self,
        content_type: ContentType,
        packet: &mut Packet,
        payload_len: usize,
    ) -> Result<(), Error> {
        let tx = self.tx.as_ref().ok_or(Error::InvalidState)?;
        self.record_mac.begin(
            tx.mac_algorithm(),
            tx.mac_key(),
            tx.sequence(),
            content_type as u8,
            tx.version().to_u16(),
            payload_len as u16,
        )?;
        let start = packet.payload_offset();
        self.record_mac.update(&packet.as_bytes()[start..])?;
        let mut tag = [0u8; MAX_MAC_LEN];
        let tag_len = self.compute_record_mac(&mut tag)?;

        self.rng.fill_bytes(packet.iv_mut());
        let tx = self.tx.as_mut().ok_or(Error::InvalidState)?;
        let sealed = tx.seal_cbc(content_type, packet, &tag[..tag_len]);
        tag.zeroize();
        sealed
    }

    /// Send `data` as one record of `content_type`.
    pub(super) fn send_record<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        content_type: ContentType,
        data: &[u8],
        wait: WaitOption,
    ) -> Result<(), Error> {
        let mut packet = self.allocate_record_packet(&*transport, wait)?;
        if data.len() > self.plaintext_room(&packet) {
            transport.release(packet);
            return Err(Error::BufferTooSmall { needed: data.len() });
        }
        if let Err(e) = packet.append(data) {
            transport.release(packet);
            return Err(e);
        }
        self.seal_and_send(transport, content_type, packet, wait)
    }

    pub(super) fn send_application_data<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        data: &[u8],
        wait: WaitOption,
    ) -> Result<(), Error> {
        let mut rest = data;
        while !rest.is_empty() {
            let mut packet = self.allocate_record_packet(&*transport, wait)?;
            let n = core::cmp::min(rest.len(), self.plaintext_room(&packet));
            if n == 0 {
                let needed = packet.len() + self.record_overhead() + 1;
                transport.release(packet);
                return Err(Error::BufferTooSmall { needed });
            }
            if let Err(e) = packet.append(&rest[..n]) {
                transport.release(packet);
                return Err(e);
            }
            self.seal_and_send(transport, ContentType::ApplicationData, packet, wait)?;
            rest = &rest[n..];
        }
        Ok(())
    }

    pub(super) fn send_alert<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        level: AlertLevel,
        description: AlertDescription,
        wait: WaitOption,
    ) -> Result<(), Error> {
        let body = encode_alert(level, description);
        self.send_record(transport, ContentType::Alert, &body, wait)
    }

    /// Write queued handshake messages until the queue is empty.
    ///
    /// A message leaves the queue only once its record is sent, so a call
    /// that stops on `NoPacket` resumes where it left off.
    pub(super) fn flush<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        wait: WaitOption,
    ) -> Result<(), Error> {
        while let Some(&next) = self.outbound.front() {
            if next == Outbound::ChangeCipherSpec {
                self.send_record(transport, ContentType::ChangeCipherSpec, &[1], wait)?;
                self.activate_write_state()?;
                self.outbound.pop_front();
                continue;
            }

            let mut packet = self.allocate_record_packet(&*transport, wait)?;
            let room = self.plaintext_room(&packet);
            let written = self.write_handshake_message(next, &mut packet.append_region()[..room]);
            let written = match written {
                Ok(n) => n,
                Err(e) => {
                    transport.release(packet);
                    return Err(e);
                }
            };
            if written == 0 {
                transport.release(packet);
                self.outbound.pop_front();
                continue;
            }
            if let Err(e) = packet.advance(written) {
                transport.release(packet);
                return Err(e);
            }
            let start = packet.len() - written;
            self.transcript.update(&packet.as_bytes()[start..]);
            if next == Outbound::ClientKeyExchange {
                if let Err(e) = self.establish_keys() {
                    transport.release(packet);
                    return Err(e);
                }
            }
            tracing::trace!(message = ?next, len = written, "handshake message queued for send");
            self.seal_and_send(transport, ContentType::Handshake, packet, wait)?;
            self.outbound.pop_front();
        }
        Ok(())
    }

    fn activate_write_state(&mut self) -> Result<(), Error> {
        self.tx = Some(self.pending_tx.take().ok_or(Error::InvalidState)?);
        self.local_session_active = true;
        Ok(())
    }

    /// Move bytes from a received packet into the record buffer.
    pub(super) fn absorb<T: Transport + ?Sized>(&mut self, transport: &mut T, packet: Packet) -> Result<(), Error> {
        let absorbed = self.recv_buf.buf_extend_from_slice(packet.as_bytes());
        transport.release(packet);
        absorbed
    }

    /// Process one complete buffered record. Returns `false` when the buffer
    /// holds no complete record.
    pub(super) fn process_next_record(&mut self) -> Result<bool, Error> {
        let Some(total) = complete_record_len(self.recv_buf.buf_as_slice())? else {
            return Ok(false);
        };
        let mut buf = core::mem::take(&mut self.recv_buf);
        let result = self.handle_record(&mut buf.buf_as_mut_slice()[..total]);
        buf.buf_drain_front(total);
        self.recv_buf = buf;
        result.map(|()| true)
    }

    fn handle_record(&mut self, record: &mut [u8]) -> Result<(), Error> {
        let header = decode_record_header(record)?;
        let fragment = &mut record[RECORD_HEADER_LEN..];
        let plaintext = match self.rx.as_ref().map(|rx| rx.is_aead()) {
            None => 0..fragment.len(),
            Some(true) => self
                .rx
                .as_mut()
                .ok_or(Error::InvalidState)?
                .open_aead(&header, fragment)?,
            Some(false) => self.open_cbc_record(&header, fragment)?,
        };
        if plaintext.len() > MAX_FRAGMENT_LEN {
            return Err(Error::Decode);
        }
        let data = &fragment[plaintext];
        tracing::trace!(content_type = ?header.content_type, len = data.len(), "record received");
        match header.content_type {
            ContentType::Handshake => self.on_handshake_data(data),
            ContentType::ChangeCipherSpec => self.on_change_cipher_spec(data),
            ContentType::Alert => self.on_alert(data),
            ContentType::ApplicationData => self.on_application_data(data),
        }
    }

    fn open_cbc_record(&mut self, header: &RecordHeader, fragment: &mut [u8]) -> Result<Range<usize>, Error> {
        let rx = self.rx.as_mut().ok_or(Error::InvalidState)?;
        let opened = rx.open_cbc(fragment)?;
        self.record_mac.begin(
            rx.mac_algorithm(),
            rx.mac_key(),
            opened.seq,
            header.content_type as u8,
            rx.version().to_u16(),
            opened.content.len() as u16,
        )?;
        self.record_mac.update(&fragment[opened.content.clone()])?;
        let mut tag = [0u8; MAX_MAC_LEN];
        let tag_len = self.compute_record_mac(&mut tag)?;
        let mac_ok = ct_eq(&tag[..tag_len], &fragment[opened.mac.clone()]);
        tag.zeroize();
        if !(mac_ok & opened.padding_ok) {
            return Err(Error::BadRecordMac);
        }
        Ok(opened.content)
    }

    fn on_change_cipher_spec(&mut self, data: &[u8]) -> Result<(), Error> {
        if data != [1] {
            return Err(Error::Decode);
        }
        let expected = matches!(
            (self.role, self.state),
            (crate::handshake::Role::Client, HandshakeState::ClientFinishedSent)
                | (crate::handshake::Role::Server, HandshakeState::ClientKeyExchangeReceived)
        );
        if !expected || self.remote_session_active || !self.hs_buf.buf_is_empty() {
            return Err(Error::UnexpectedMessage);
        }
        self.rx = Some(self.pending_rx.take().ok_or(Error::UnexpectedMessage)?);
        self.remote_session_active = true;
        tracing::debug!(role = ?self.role, "peer cipher spec active");
        Ok(())
    }

    fn on_alert(&mut self, data: &[u8]) -> Result<(), Error> {
        let (level, description) = decode_alert(data)?;
        if description == AlertDescription::CloseNotify {
            tracing::debug!(role = ?self.role, "peer sent close_notify");
            self.peer_closed = true;
            return Err(Error::Closed);
        }
        match level {
            AlertLevel::Warning => {
                tracing::warn!(?description, "warning alert from peer ignored");
                Ok(())
            }
            AlertLevel::Fatal => {
                tracing::warn!(?description, "fatal alert from peer");
                Err(Error::Alert(description))
            }
        }
    }

    fn on_application_data(&mut self, data: &[u8]) -> Result<(), Error> {
        if self.state != HandshakeState::HandshakeFinished || !self.remote_session_active {
            return Err(Error::UnexpectedMessage);
        }
        self.app_buf.buf_extend_from_slice(data)
    }

    /// Record a fatal error: alert the peer where that makes sense and
    /// park the session in `Failed`.
    pub(super) fn abort<T: Transport + ?Sized>(&mut self, transport: &mut T, error: Error) -> Error {
        match error {
            Error::NoPacket => return error,
            Error::Closed if self.state == HandshakeState::HandshakeFinished => return error,
            _ => {}
        }
        tracing::debug!(role = ?self.role, state = ?self.state, ?error, "session failed");
        if let Some(description) = error.alert() {
            if self
                .send_alert(transport, AlertLevel::Fatal, description, WaitOption::NoWait)
                .is_err()
            {
                tracing::debug!(?description, "could not deliver fatal alert");
            }
        }
        self.outbound.clear();
        self.peer_finished = false;
        self.state = HandshakeState::Failed;
        error
    }
}
