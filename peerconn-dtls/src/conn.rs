#[cfg(test)]
mod conn_test;

use bytes::BytesMut;
use log::{debug, trace, warn};
use sha2::{Digest, Sha256};
use shared::error::{Error, Result};
use shared::replay_detector::{ReplayDetector, SlidingWindowDetector};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::alert::{Alert, AlertDescription, AlertLevel};
use crate::cipher_suite::{find_matching_cipher_suite, CipherSuite, CipherSuiteId};
use crate::config::{ExtendedMasterSecretType, HandshakeConfig};
use crate::crypto::{
    generate_cookie, sign_content, signed_key_exchange_content, verify_signature,
    SignatureHashAlgorithm, HASH_SHA256, SIGNATURE_ECDSA, SIGNATURE_HASH_ALGORITHMS,
    SIGNATURE_RSA,
};
use crate::curve::{NamedCurve, DEFAULT_NAMED_CURVE};
use crate::extension::Extension;
use crate::flight::{srv_cli_str, Flight, HandshakeState};
use crate::fragment::FragmentBuffer;
use crate::handshake::certificate::{
    CertificateRequest, CertificateVerify, HandshakeMessageCertificate,
    CERTIFICATE_TYPE_ECDSA_SIGN, CERTIFICATE_TYPE_RSA_SIGN,
};
use crate::handshake::client_hello::ClientHello;
use crate::handshake::finished::Finished;
use crate::handshake::key_exchange::{ClientKeyExchange, ServerKeyExchange};
use crate::handshake::server_hello::{HelloVerifyRequest, ServerHello};
use crate::handshake::{HandshakeHeader, HandshakeMessage, HandshakeType};
use crate::prf::{
    prf_extended_master_secret, prf_master_secret, prf_verify_data_client,
    prf_verify_data_server,
};
use crate::record::{
    split_records, ContentType, RecordLayerHeader, MAX_SEQUENCE_NUMBER,
    PROTOCOL_VERSION1_2, RECORD_LAYER_HEADER_SIZE,
};
use crate::state::State;
use crate::SrtpProtectionProfile;

const RECORD_REPLAY_WINDOW: u64 = 64;

/// A record queued for (re)transmission, still in plaintext form so
/// retransmits can be re-protected under fresh sequence numbers.
#[derive(Clone)]
struct PlaintextRecord {
    content_type: ContentType,
    epoch: u16,
    payload: Vec<u8>,
}

/// Stores the latest copy of every handshake message for transcript
/// computations; retransmissions overwrite in place so hashes stay stable.
#[derive(Default)]
struct HandshakeCache {
    messages: HashMap<(HandshakeType, bool), Vec<u8>>,
}

impl HandshakeCache {
    fn put(&mut self, typ: HandshakeType, from_client: bool, bytes: Vec<u8>) {
        self.messages.insert((typ, from_client), bytes);
    }

    /// Concatenates the cached messages in canonical order, skipping absent
    /// entries.
    fn pull(&self, order: &[(HandshakeType, bool)]) -> Vec<u8> {
        let mut out = vec![];
        for key in order {
            if let Some(bytes) = self.messages.get(key) {
                out.extend_from_slice(bytes);
            }
        }
        out
    }
}

/// The canonical transcript through ClientKeyExchange (the session hash
/// input of RFC 7627).
const ORDER_THROUGH_CLIENT_KEY_EXCHANGE: &[(HandshakeType, bool)] = &[
    (HandshakeType::ClientHello, true),
    (HandshakeType::ServerHello, false),
    (HandshakeType::Certificate, false),
    (HandshakeType::ServerKeyExchange, false),
    (HandshakeType::CertificateRequest, false),
    (HandshakeType::ServerHelloDone, false),
    (HandshakeType::Certificate, true),
    (HandshakeType::ClientKeyExchange, true),
];

const ORDER_THROUGH_CERTIFICATE_VERIFY: &[(HandshakeType, bool)] = &[
    (HandshakeType::ClientHello, true),
    (HandshakeType::ServerHello, false),
    (HandshakeType::Certificate, false),
    (HandshakeType::ServerKeyExchange, false),
    (HandshakeType::CertificateRequest, false),
    (HandshakeType::ServerHelloDone, false),
    (HandshakeType::Certificate, true),
    (HandshakeType::ClientKeyExchange, true),
    (HandshakeType::CertificateVerify, true),
];

const ORDER_THROUGH_CLIENT_FINISHED: &[(HandshakeType, bool)] = &[
    (HandshakeType::ClientHello, true),
    (HandshakeType::ServerHello, false),
    (HandshakeType::Certificate, false),
    (HandshakeType::ServerKeyExchange, false),
    (HandshakeType::CertificateRequest, false),
    (HandshakeType::ServerHelloDone, false),
    (HandshakeType::Certificate, true),
    (HandshakeType::ClientKeyExchange, true),
    (HandshakeType::CertificateVerify, true),
    (HandshakeType::Finished, true),
];

/// DTLSConn is a single DTLS 1.2 connection: record layer, handshake state
/// machine and application data framing, with no I/O of its own.
pub struct DTLSConn {
    config: Arc<HandshakeConfig>,
    pub(crate) state: State,
    remote_addr: SocketAddr,

    current_flight: Flight,
    current_handshake_state: HandshakeState,
    flights: Option<Vec<PlaintextRecord>>,
    current_retransmit_count: usize,
    current_retransmit_interval: Duration,
    pub current_retransmit_timer: Option<Instant>,
    handshake_completed: bool,
    closed: bool,

    local_sequence_numbers: Vec<u64>,
    remote_replay_detectors: HashMap<u16, SlidingWindowDetector>,

    fragment_buffer: FragmentBuffer,
    cache: HandshakeCache,
    received_messages: HashMap<HandshakeType, Vec<u8>>,
    handshake_rx: bool,
    remote_ecdhe_public: Vec<u8>,
    peer_requested_certificate: bool,

    pending_encrypted_records: Vec<Vec<u8>>,
    outgoing_packets: VecDeque<BytesMut>,
    incoming_application_data: VecDeque<BytesMut>,
}

impl DTLSConn {
    pub fn new(config: Arc<HandshakeConfig>, is_client: bool, remote_addr: SocketAddr) -> Self {
        let mut state = State::new(is_client);
        state.local_random.populate();

        DTLSConn {
            config,
            state,
            remote_addr,
            current_flight: if is_client {
                Flight::Flight1
            } else {
                Flight::Flight0
            },
            current_handshake_state: if is_client {
                HandshakeState::Preparing
            } else {
                HandshakeState::Waiting
            },
            flights: None,
            current_retransmit_count: 0,
            current_retransmit_interval: Duration::from_secs(1),
            current_retransmit_timer: None,
            handshake_completed: false,
            closed: false,
            local_sequence_numbers: vec![0, 0],
            remote_replay_detectors: HashMap::new(),
            fragment_buffer: FragmentBuffer::new(),
            cache: HandshakeCache::default(),
            received_messages: HashMap::new(),
            handshake_rx: false,
            remote_ecdhe_public: vec![],
            peer_requested_certificate: false,
            pending_encrypted_records: vec![],
            outgoing_packets: VecDeque::new(),
            incoming_application_data: VecDeque::new(),
        }
    }

    pub fn is_handshake_completed(&self) -> bool {
        self.handshake_completed
    }

    pub fn connection_state(&self) -> &State {
        &self.state
    }

    /// Drains the next datagram to put on the wire.
    pub fn outgoing_raw_packet(&mut self) -> Option<BytesMut> {
        self.outgoing_packets.pop_front()
    }

    /// Drains the next decrypted application payload.
    pub fn incoming_application_data(&mut self) -> Option<BytesMut> {
        self.incoming_application_data.pop_front()
    }

    /// Sends application data; only valid once the handshake completed.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::ErrConnClosed);
        }
        if !self.handshake_completed {
            return Err(Error::ErrHandshakeInProgress);
        }

        let record = PlaintextRecord {
            content_type: ContentType::ApplicationData,
            epoch: self.state.local_epoch,
            payload: data.to_vec(),
        };
        self.write_records(&[record])
    }

    /// Initiates a graceful shutdown with a close_notify alert.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.send_alert(AlertLevel::Warning, AlertDescription::CloseNotify);
    }

    /// Processes one inbound datagram, which may hold several records.
    pub fn read(&mut self, datagram: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::ErrConnClosed);
        }

        for record in split_records(datagram)? {
            let owned = record.to_vec();
            self.handle_record(&owned)?;
        }
        Ok(())
    }

    /// Re-processes records that arrived encrypted before the cipher was
    /// ready.
    pub fn handle_incoming_queued_packets(&mut self) -> Result<()> {
        if self.state.cipher_suite.is_none() {
            return Ok(());
        }
        let pending = std::mem::take(&mut self.pending_encrypted_records);
        for record in pending {
            self.handle_record(&record)?;
        }
        Ok(())
    }

    fn handle_record(&mut self, record: &[u8]) -> Result<()> {
        let header = RecordLayerHeader::unmarshal(record)?;

        let detector = self
            .remote_replay_detectors
            .entry(header.epoch)
            .or_insert_with(|| {
                SlidingWindowDetector::new(RECORD_REPLAY_WINDOW, MAX_SEQUENCE_NUMBER)
            });
        if !detector.check(header.sequence_number) {
            trace!(
                "[{}] dropping replayed record epoch={} seq={}",
                srv_cli_str(self.state.is_client),
                header.epoch,
                header.sequence_number
            );
            return Ok(());
        }

        let payload = if header.epoch > 0 {
            if self.state.cipher_suite.is_none() {
                // Hold on to it until ChangeCipherSpec lands and keys exist
                self.pending_encrypted_records.push(record.to_vec());
                return Ok(());
            }
            let cipher = self.state.cipher_suite.as_ref().unwrap();
            match cipher.decrypt(record) {
                Ok(p) => p,
                Err(err) => {
                    debug!(
                        "[{}] discarding undecryptable record: {}",
                        srv_cli_str(self.state.is_client),
                        err
                    );
                    return Ok(());
                }
            }
        } else {
            record[RECORD_LAYER_HEADER_SIZE..].to_vec()
        };

        // Only commit the replay window entry once the record authenticated
        self.remote_replay_detectors
            .get_mut(&header.epoch)
            .expect("detector exists")
            .accept();

        match header.content_type {
            ContentType::Handshake => {
                let mut offset = 0usize;
                while offset < payload.len() {
                    let hs_header = HandshakeHeader::unmarshal(&payload[offset..])?;
                    let fragment_end = offset
                        + crate::handshake::HANDSHAKE_HEADER_LENGTH
                        + hs_header.fragment_length as usize;
                    if payload.len() < fragment_end {
                        return Err(Error::ErrDtlsPacketInvalidLength);
                    }
                    if let Some((typ, msg_seq, body)) =
                        self.fragment_buffer.push(&payload[offset..fragment_end])?
                    {
                        self.process_handshake_message(typ, msg_seq, body)?;
                    }
                    offset = fragment_end;
                }

                if !self.handshake_completed {
                    self.handshake()?;
                    self.handle_incoming_queued_packets()?;
                } else if self.handshake_rx && !self.state.is_client {
                    // The client retransmitted its final flight: our
                    // Finished was lost, re-emit it
                    self.handshake_rx = false;
                    self.received_messages.clear();
                    self.retransmit_current_flight()?;
                } else {
                    self.handshake_rx = false;
                    self.received_messages.clear();
                }
            }
            ContentType::ChangeCipherSpec => {
                trace!(
                    "[{}] <- ChangeCipherSpec (epoch: {})",
                    srv_cli_str(self.state.is_client),
                    header.epoch + 1
                );
                self.state.remote_epoch = header.epoch + 1;
            }
            ContentType::Alert => {
                let alert = Alert::unmarshal(&payload)?;
                debug!(
                    "[{}] <- {}",
                    srv_cli_str(self.state.is_client),
                    alert
                );
                if alert.alert_level == AlertLevel::Fatal
                    || alert.alert_description == AlertDescription::CloseNotify
                {
                    self.closed = true;
                    return Err(Error::ErrAlertFatalOrClose);
                }
            }
            ContentType::ApplicationData => {
                if header.epoch == 0 {
                    return Err(Error::ErrApplicationDataEpochZero);
                }
                self.incoming_application_data
                    .push_back(BytesMut::from(&payload[..]));
            }
            ContentType::Unsupported => return Err(Error::ErrUnhandledContentType),
        }

        Ok(())
    }

    fn process_handshake_message(
        &mut self,
        typ: HandshakeType,
        msg_seq: u16,
        body: Vec<u8>,
    ) -> Result<()> {
        trace!(
            "[{}] <- {} (seq {})",
            srv_cli_str(self.state.is_client),
            typ,
            msg_seq
        );

        // Reconstruct the unfragmented form for the transcript (RFC 6347
        // section 4.2.6).
        let header = HandshakeHeader {
            handshake_type: typ,
            length: body.len() as u32,
            message_sequence: msg_seq,
            fragment_offset: 0,
            fragment_length: body.len() as u32,
        };
        let mut full = header.marshal();
        full.extend_from_slice(&body);

        let from_client = !self.state.is_client;
        let cacheable = match typ {
            HandshakeType::HelloVerifyRequest => false,
            // the un-cookied ClientHello is excluded from the transcript
            HandshakeType::ClientHello => {
                ClientHello::unmarshal(&body).map(|ch| !ch.cookie.is_empty()).unwrap_or(false)
            }
            _ => true,
        };
        if cacheable {
            self.cache.put(typ, from_client, full);
        }

        self.received_messages.insert(typ, body.clone());
        self.handshake_rx = true;

        // The server derives keys the moment ClientKeyExchange arrives, so
        // the encrypted Finished in the same datagram can be read.
        if typ == HandshakeType::ClientKeyExchange && !self.state.is_client {
            let cke = ClientKeyExchange::unmarshal(&body)?;
            let keypair = self
                .state
                .local_keypair
                .as_ref()
                .ok_or(Error::ErrInvalidNamedCurve)?;
            self.state.pre_master_secret = keypair.shared_secret(&cke.public_key)?;
            self.derive_master_secret_and_cipher()?;
        }

        Ok(())
    }

    fn derive_master_secret_and_cipher(&mut self) -> Result<()> {
        let client_random = if self.state.is_client {
            self.state.local_random.marshal()
        } else {
            self.state.remote_random.marshal()
        };
        let server_random = if self.state.is_client {
            self.state.remote_random.marshal()
        } else {
            self.state.local_random.marshal()
        };

        self.state.master_secret = if self.state.extended_master_secret {
            let session_hash =
                Sha256::digest(self.cache.pull(ORDER_THROUGH_CLIENT_KEY_EXCHANGE));
            prf_extended_master_secret(&self.state.pre_master_secret, &session_hash)?
        } else {
            prf_master_secret(
                &self.state.pre_master_secret,
                &client_random,
                &server_random,
            )?
        };

        let id = self.state.cipher_suite_id.ok_or(Error::ErrCipherSuiteUnset)?;
        self.state.cipher_suite = Some(CipherSuite::new(
            id,
            &self.state.master_secret,
            &client_random,
            &server_random,
            self.state.is_client,
        )?);
        Ok(())
    }

    // The RFC 6347 section 4.2.4 driver loop.
    pub fn handshake(&mut self) -> Result<()> {
        loop {
            trace!(
                "[handshake:{}] {}: {}",
                srv_cli_str(self.state.is_client),
                self.current_flight,
                self.current_handshake_state
            );

            if self.current_handshake_state == HandshakeState::Finished
                && !self.handshake_completed
            {
                self.set_handshake_completed();
                debug!(
                    "[handshake:{}] is completed",
                    srv_cli_str(self.state.is_client),
                );
                return Ok(());
            }

            let previous = self.current_handshake_state;
            self.current_handshake_state = match previous {
                HandshakeState::Preparing => self.prepare()?,
                HandshakeState::Sending => self.send()?,
                HandshakeState::Waiting => self.wait()?,
                HandshakeState::Finished => self.finish()?,
                HandshakeState::Errored => return Err(Error::ErrHandshakeTimeout),
            };

            if previous == self.current_handshake_state
                && matches!(previous, HandshakeState::Waiting | HandshakeState::Finished)
            {
                // wait for timeout or incoming packet
                return Ok(());
            }
        }
    }

    fn set_handshake_completed(&mut self) {
        self.handshake_completed = true;
        self.current_retransmit_timer = None;
    }

    fn prepare(&mut self) -> Result<HandshakeState> {
        self.current_retransmit_count = 0;
        self.current_retransmit_interval = self.config.retransmit_interval;
        self.flights = Some(self.generate_flight()?);
        Ok(HandshakeState::Sending)
    }

    fn send(&mut self) -> Result<HandshakeState> {
        if let Some(records) = self.flights.clone() {
            self.write_records(&records)?;
        }

        if self.current_flight.is_last_send_flight() {
            Ok(HandshakeState::Finished)
        } else {
            if self.current_flight.has_retransmit() {
                self.current_retransmit_timer =
                    Some(Instant::now() + self.current_retransmit_interval);
            }
            Ok(HandshakeState::Waiting)
        }
    }

    fn wait(&mut self) -> Result<HandshakeState> {
        if !self.handshake_rx {
            return Ok(HandshakeState::Waiting);
        }
        self.handshake_rx = false;

        match self.parse_flight() {
            Err(err) => {
                debug!(
                    "[handshake:{}] {} parse error: {}",
                    srv_cli_str(self.state.is_client),
                    self.current_flight,
                    err
                );
                Err(err)
            }
            Ok(Some(next_flight)) => {
                debug!(
                    "[handshake:{}] {} -> {}",
                    srv_cli_str(self.state.is_client),
                    self.current_flight,
                    next_flight
                );
                self.current_retransmit_timer = None;
                self.received_messages.clear();

                if next_flight.is_last_recv_flight() && self.current_flight == next_flight {
                    return Ok(HandshakeState::Finished);
                }
                self.current_flight = next_flight;
                Ok(HandshakeState::Preparing)
            }
            Ok(None) => {
                // Not enough yet. A retransmitted earlier flight from the
                // peer means our last flight was lost: re-emit it.
                if self.peer_retransmitted_earlier_flight() {
                    self.received_messages.clear();
                    return Ok(HandshakeState::Sending);
                }
                Ok(HandshakeState::Waiting)
            }
        }
    }

    fn finish(&mut self) -> Result<HandshakeState> {
        // Only the server lands here with traffic still inbound: the client
        // retransmitting its final flight because our Finished was lost.
        if self.handshake_rx {
            self.handshake_rx = false;
            self.received_messages.clear();
            return Ok(HandshakeState::Sending);
        }
        Ok(HandshakeState::Finished)
    }

    fn peer_retransmitted_earlier_flight(&self) -> bool {
        match self.current_flight {
            Flight::Flight3 => self
                .received_messages
                .contains_key(&HandshakeType::HelloVerifyRequest),
            Flight::Flight4 => self.received_messages.contains_key(&HandshakeType::ClientHello),
            Flight::Flight5 => self
                .received_messages
                .contains_key(&HandshakeType::ServerHelloDone),
            _ => false,
        }
    }

    fn retransmit_current_flight(&mut self) -> Result<()> {
        if let Some(records) = self.flights.clone() {
            self.write_records(&records)?;
        }
        Ok(())
    }

    /// Called by the embedding endpoint when the retransmit deadline passed.
    pub fn handshake_timeout(&mut self, _now: Instant) -> Result<()> {
        let next = if self.current_handshake_state == HandshakeState::Waiting {
            debug!(
                "[handshake:{}] {} retransmit (count {} of {})",
                srv_cli_str(self.state.is_client),
                self.current_flight,
                self.current_retransmit_count,
                self.config.maximum_retransmit_number,
            );
            self.current_retransmit_count += 1;
            if self.current_retransmit_count > self.config.maximum_retransmit_number {
                Some(HandshakeState::Errored)
            } else {
                self.current_retransmit_interval = std::cmp::min(
                    self.current_retransmit_interval * 2,
                    self.config.max_retransmit_interval,
                );
                Some(HandshakeState::Sending)
            }
        } else if self.current_handshake_state == HandshakeState::Finished {
            // Retransmit the last flight
            Some(HandshakeState::Sending)
        } else {
            None
        };

        if let Some(next) = next {
            self.current_handshake_state = next;
            self.handshake()
        } else {
            Ok(())
        }
    }

    fn local_cipher_suites(&self) -> Vec<CipherSuiteId> {
        // Our identity is ECDSA; as a server only the ECDSA suite applies,
        // as a client both are offered (the server's certificate decides).
        if self.state.is_client {
            vec![
                CipherSuiteId::TlsEcdheEcdsaWithAes128GcmSha256,
                CipherSuiteId::TlsEcdheRsaWithAes128GcmSha256,
            ]
        } else {
            vec![CipherSuiteId::TlsEcdheEcdsaWithAes128GcmSha256]
        }
    }

    fn build_client_hello(&self) -> ClientHello {
        let mut extensions = vec![
            Extension::SupportedEllipticCurves(vec![NamedCurve::X25519, NamedCurve::P256]),
            Extension::SupportedPointFormats,
            Extension::SignatureAlgorithms(SIGNATURE_HASH_ALGORITHMS.to_vec()),
            Extension::RenegotiationInfo,
        ];
        if !self.config.local_srtp_protection_profiles.is_empty() {
            extensions.push(Extension::UseSrtp(
                self.config.local_srtp_protection_profiles.clone(),
            ));
        }
        if self.config.extended_master_secret != ExtendedMasterSecretType::Disable {
            extensions.push(Extension::UseExtendedMasterSecret);
        }

        ClientHello {
            version: PROTOCOL_VERSION1_2,
            random: self.state.local_random,
            cookie: self.state.cookie.clone(),
            cipher_suites: self
                .local_cipher_suites()
                .iter()
                .map(|c| *c as u16)
                .collect(),
            extensions,
        }
    }

    fn generate_flight(&mut self) -> Result<Vec<PlaintextRecord>> {
        let mut records = vec![];
        match self.current_flight {
            Flight::Flight1 | Flight::Flight3 => {
                let hello = self.build_client_hello();
                records.push(self.handshake_record(HandshakeMessage::ClientHello(hello), 0)?);
            }
            Flight::Flight2 => {
                let cookie = generate_cookie(
                    &self.config.cookie_secret,
                    &self.state.remote_random.marshal(),
                    &self.remote_addr.to_string(),
                )?;
                let hvr = HelloVerifyRequest {
                    version: PROTOCOL_VERSION1_2,
                    cookie,
                };
                records
                    .push(self.handshake_record(HandshakeMessage::HelloVerifyRequest(hvr), 0)?);
            }
            Flight::Flight4 => {
                let mut extensions = vec![Extension::RenegotiationInfo];
                if self.state.srtp_protection_profile != SrtpProtectionProfile::Unsupported {
                    extensions.push(Extension::UseSrtp(vec![self.state.srtp_protection_profile]));
                }
                if self.state.extended_master_secret {
                    extensions.push(Extension::UseExtendedMasterSecret);
                }

                let server_hello = ServerHello {
                    version: PROTOCOL_VERSION1_2,
                    random: self.state.local_random,
                    cipher_suite: self.state.cipher_suite_id.ok_or(Error::ErrCipherSuiteUnset)?
                        as u16,
                    extensions,
                };
                records
                    .push(self.handshake_record(HandshakeMessage::ServerHello(server_hello), 0)?);

                let certificate = HandshakeMessageCertificate {
                    certificates: vec![self.config.certificate.certificate_der.clone()],
                };
                records
                    .push(self.handshake_record(HandshakeMessage::Certificate(certificate), 0)?);

                if self.state.local_keypair.is_none() {
                    self.state.local_keypair = Some(self.state.named_curve.generate_keypair()?);
                }
                let keypair = self.state.local_keypair.as_ref().unwrap();
                let public_key = keypair.public_key();
                let content = signed_key_exchange_content(
                    &self.state.remote_random.marshal(),
                    &self.state.local_random.marshal(),
                    self.state.named_curve,
                    &public_key,
                );
                let signature = sign_content(&self.config.certificate.private_key, &content);
                let ske = ServerKeyExchange {
                    named_curve: self.state.named_curve,
                    public_key,
                    algorithm: SignatureHashAlgorithm {
                        hash: HASH_SHA256,
                        signature: SIGNATURE_ECDSA,
                    },
                    signature,
                };
                records.push(self.handshake_record(HandshakeMessage::ServerKeyExchange(ske), 0)?);

                let request = CertificateRequest {
                    certificate_types: vec![
                        CERTIFICATE_TYPE_ECDSA_SIGN,
                        CERTIFICATE_TYPE_RSA_SIGN,
                    ],
                    signature_hash_algorithms: SIGNATURE_HASH_ALGORITHMS.to_vec(),
                };
                records.push(
                    self.handshake_record(HandshakeMessage::CertificateRequest(request), 0)?,
                );

                records.push(self.handshake_record(HandshakeMessage::ServerHelloDone, 0)?);
            }
            Flight::Flight5 => {
                if self.peer_requested_certificate {
                    let certificate = HandshakeMessageCertificate {
                        certificates: vec![self.config.certificate.certificate_der.clone()],
                    };
                    records.push(
                        self.handshake_record(HandshakeMessage::Certificate(certificate), 0)?,
                    );
                }

                if self.state.local_keypair.is_none() {
                    self.state.local_keypair = Some(self.state.named_curve.generate_keypair()?);
                }
                let keypair = self.state.local_keypair.as_ref().unwrap();
                let cke = ClientKeyExchange {
                    public_key: keypair.public_key(),
                };
                self.state.pre_master_secret = keypair.shared_secret(&self.remote_ecdhe_public)?;
                records.push(self.handshake_record(HandshakeMessage::ClientKeyExchange(cke), 0)?);

                self.derive_master_secret_and_cipher()?;

                if self.peer_requested_certificate {
                    let content = self.cache.pull(ORDER_THROUGH_CLIENT_KEY_EXCHANGE);
                    let signature =
                        sign_content(&self.config.certificate.private_key, &content);
                    let verify = CertificateVerify {
                        algorithm: SignatureHashAlgorithm {
                            hash: HASH_SHA256,
                            signature: SIGNATURE_ECDSA,
                        },
                        signature,
                    };
                    records.push(
                        self.handshake_record(HandshakeMessage::CertificateVerify(verify), 0)?,
                    );
                }

                records.push(PlaintextRecord {
                    content_type: ContentType::ChangeCipherSpec,
                    epoch: 0,
                    payload: vec![1],
                });

                let verify_data = prf_verify_data_client(
                    &self.state.master_secret,
                    &self.cache.pull(ORDER_THROUGH_CERTIFICATE_VERIFY),
                )?;
                records.push(
                    self.handshake_record(HandshakeMessage::Finished(Finished { verify_data }), 1)?,
                );
            }
            Flight::Flight6 => {
                records.push(PlaintextRecord {
                    content_type: ContentType::ChangeCipherSpec,
                    epoch: 0,
                    payload: vec![1],
                });

                let verify_data = prf_verify_data_server(
                    &self.state.master_secret,
                    &self.cache.pull(ORDER_THROUGH_CLIENT_FINISHED),
                )?;
                records.push(
                    self.handshake_record(HandshakeMessage::Finished(Finished { verify_data }), 1)?,
                );
            }
            Flight::Flight0 => {}
        }
        Ok(records)
    }

    /// Serializes a handshake message into a record, assigning the next
    /// message sequence and caching it for the transcript.
    fn handshake_record(
        &mut self,
        message: HandshakeMessage,
        epoch: u16,
    ) -> Result<PlaintextRecord> {
        let msg_seq = self.state.handshake_send_sequence;
        self.state.handshake_send_sequence += 1;

        let full = message.marshal_with_header(msg_seq)?;

        let typ = message.handshake_type();
        let cacheable = !matches!(typ, HandshakeType::HelloVerifyRequest)
            && !(typ == HandshakeType::ClientHello && self.state.cookie.is_empty());
        if cacheable {
            self.cache.put(typ, self.state.is_client, full.clone());
        }

        trace!(
            "[{}] -> {} (seq {})",
            srv_cli_str(self.state.is_client),
            typ,
            msg_seq
        );

        Ok(PlaintextRecord {
            content_type: ContentType::Handshake,
            epoch,
            payload: full,
        })
    }

    /// Protects and batches records into a single outgoing datagram.
    fn write_records(&mut self, records: &[PlaintextRecord]) -> Result<()> {
        let mut datagram = BytesMut::new();

        for record in records {
            if record.epoch as usize >= self.local_sequence_numbers.len() {
                self.local_sequence_numbers.push(0);
            }
            let sequence_number = self.local_sequence_numbers[record.epoch as usize];
            self.local_sequence_numbers[record.epoch as usize] += 1;

            let header = RecordLayerHeader {
                content_type: record.content_type,
                protocol_version: PROTOCOL_VERSION1_2,
                epoch: record.epoch,
                sequence_number,
                content_len: record.payload.len() as u16,
            };

            if record.epoch > 0 {
                let cipher = self
                    .state
                    .cipher_suite
                    .as_ref()
                    .ok_or(Error::ErrCipherSuiteUnset)?;
                datagram.extend_from_slice(&cipher.encrypt(&header, &record.payload)?);
            } else {
                datagram.extend_from_slice(&header.marshal()?);
                datagram.extend_from_slice(&record.payload);
            }

            if record.content_type == ContentType::ChangeCipherSpec
                && self.state.local_epoch == record.epoch
            {
                trace!(
                    "[{}] -> ChangeCipherSpec (epoch: {})",
                    srv_cli_str(self.state.is_client),
                    record.epoch + 1
                );
                self.state.local_epoch = record.epoch + 1;
            }
        }

        if !datagram.is_empty() {
            self.outgoing_packets.push_back(datagram);
        }
        Ok(())
    }

    fn send_alert(&mut self, level: AlertLevel, description: AlertDescription) -> Result<()> {
        let record = PlaintextRecord {
            content_type: ContentType::Alert,
            epoch: self.state.local_epoch,
            payload: Alert {
                alert_level: level,
                alert_description: description,
            }
            .marshal(),
        };
        self.write_records(&[record])
    }

    fn verify_peer_certificate(&mut self, certificates: &[Vec<u8>]) -> Result<()> {
        if certificates.is_empty() {
            return Err(Error::ErrInvalidCertificate);
        }
        if let Some(expected) = &self.config.remote_fingerprint {
            let actual = crate::crypto::fingerprint_of_der(&certificates[0]);
            if !actual.eq_ignore_ascii_case(expected) {
                warn!(
                    "[{}] peer certificate fingerprint mismatch",
                    srv_cli_str(self.state.is_client)
                );
                let _ = self.send_alert(AlertLevel::Fatal, AlertDescription::BadCertificate);
                return Err(Error::ErrInvalidCertificate);
            }
        }
        self.state.peer_certificates = certificates.to_vec();
        Ok(())
    }

    /// The signature algorithm the negotiated suite implies for the peer's
    /// key exchange signature.
    fn expected_peer_signature(&self) -> Result<u8> {
        match self.state.cipher_suite_id {
            Some(id) if id.is_ecdsa() => Ok(SIGNATURE_ECDSA),
            Some(_) => Ok(SIGNATURE_RSA),
            None => Err(Error::ErrCipherSuiteUnset),
        }
    }

    fn parse_flight(&mut self) -> Result<Option<Flight>> {
        match self.current_flight {
            Flight::Flight0 | Flight::Flight2 => {
                let Some(body) = self.received_messages.get(&HandshakeType::ClientHello).cloned()
                else {
                    return Ok(None);
                };
                let client_hello = ClientHello::unmarshal(&body)?;

                if client_hello.version != PROTOCOL_VERSION1_2 {
                    let _ =
                        self.send_alert(AlertLevel::Fatal, AlertDescription::ProtocolVersion);
                    return Err(Error::ErrUnsupportedProtocolVersion);
                }

                self.state.remote_random = client_hello.random;

                let id = match find_matching_cipher_suite(
                    &client_hello.known_cipher_suites(),
                    &self.local_cipher_suites(),
                ) {
                    Ok(id) => id,
                    Err(err) => {
                        let _ = self
                            .send_alert(AlertLevel::Fatal, AlertDescription::InsufficientSecurity);
                        return Err(err);
                    }
                };
                self.state.cipher_suite_id = Some(id);

                self.state.named_curve = DEFAULT_NAMED_CURVE;
                for extension in &client_hello.extensions {
                    match extension {
                        Extension::SupportedEllipticCurves(curves) => {
                            if curves.is_empty() {
                                let _ = self.send_alert(
                                    AlertLevel::Fatal,
                                    AlertDescription::InsufficientSecurity,
                                );
                                return Err(Error::ErrNoSupportedEllipticCurves);
                            }
                            if let Some(curve) =
                                curves.iter().find(|c| **c != NamedCurve::Unsupported)
                            {
                                self.state.named_curve = *curve;
                            }
                        }
                        Extension::UseSrtp(profiles) => {
                            // server preference wins over the intersection
                            let chosen = self
                                .config
                                .local_srtp_protection_profiles
                                .iter()
                                .find(|local| profiles.contains(local));
                            match chosen {
                                Some(profile) => {
                                    self.state.srtp_protection_profile = *profile;
                                }
                                None => {
                                    let _ = self.send_alert(
                                        AlertLevel::Fatal,
                                        AlertDescription::InsufficientSecurity,
                                    );
                                    return Err(Error::ErrServerNoMatchingSrtpProfile);
                                }
                            }
                        }
                        Extension::UseExtendedMasterSecret => {
                            if self.config.extended_master_secret
                                != ExtendedMasterSecretType::Disable
                            {
                                self.state.extended_master_secret = true;
                            }
                        }
                        _ => {}
                    }
                }

                if self.config.extended_master_secret == ExtendedMasterSecretType::Require
                    && !self.state.extended_master_secret
                {
                    let _ = self
                        .send_alert(AlertLevel::Fatal, AlertDescription::InsufficientSecurity);
                    return Err(Error::ErrServerRequiredButNoClientEms);
                }

                if client_hello.cookie.is_empty() {
                    return Ok(Some(Flight::Flight2));
                }

                // Cookie must round-trip exactly (stateless verification)
                let expected = generate_cookie(
                    &self.config.cookie_secret,
                    &client_hello.random.marshal(),
                    &self.remote_addr.to_string(),
                )?;
                if expected != client_hello.cookie {
                    let _ =
                        self.send_alert(AlertLevel::Fatal, AlertDescription::HandshakeFailure);
                    return Err(Error::ErrCookieMismatch);
                }

                if self.state.local_keypair.is_none() {
                    self.state.local_keypair = Some(self.state.named_curve.generate_keypair()?);
                }

                Ok(Some(Flight::Flight4))
            }
            Flight::Flight1 => {
                let Some(body) = self
                    .received_messages
                    .get(&HandshakeType::HelloVerifyRequest)
                    .cloned()
                else {
                    return Ok(None);
                };
                let hvr = HelloVerifyRequest::unmarshal(&body)?;
                self.state.cookie = hvr.cookie;
                Ok(Some(Flight::Flight3))
            }
            Flight::Flight3 => {
                // The whole server flight must be present before acting
                if !self.received_messages.contains_key(&HandshakeType::ServerHelloDone) {
                    return Ok(None);
                }
                let Some(sh_body) = self.received_messages.get(&HandshakeType::ServerHello).cloned()
                else {
                    return Ok(None);
                };
                let Some(cert_body) =
                    self.received_messages.get(&HandshakeType::Certificate).cloned()
                else {
                    return Ok(None);
                };
                let Some(ske_body) = self
                    .received_messages
                    .get(&HandshakeType::ServerKeyExchange)
                    .cloned()
                else {
                    return Ok(None);
                };

                let server_hello = ServerHello::unmarshal(&sh_body)?;
                let id = CipherSuiteId::from_u16(server_hello.cipher_suite)?;
                if !self.local_cipher_suites().contains(&id) {
                    return Err(Error::ErrInvalidCipherSuite);
                }
                self.state.cipher_suite_id = Some(id);
                self.state.remote_random = server_hello.random;

                let mut srtp_echoed = false;
                for extension in &server_hello.extensions {
                    match extension {
                        Extension::UseSrtp(profiles) => {
                            srtp_echoed = true;
                            let profile = profiles.first().copied().unwrap_or_default();
                            if !self
                                .config
                                .local_srtp_protection_profiles
                                .contains(&profile)
                            {
                                return Err(Error::ErrClientNoMatchingSrtpProfile);
                            }
                            self.state.srtp_protection_profile = profile;
                        }
                        Extension::UseExtendedMasterSecret => {
                            self.state.extended_master_secret = true;
                        }
                        _ => {}
                    }
                }

                if !self.config.local_srtp_protection_profiles.is_empty() && !srtp_echoed {
                    return Err(Error::ErrRequestedButNoSrtpExtension);
                }
                if self.config.extended_master_secret == ExtendedMasterSecretType::Require
                    && !self.state.extended_master_secret
                {
                    return Err(Error::ErrClientRequiredButNoServerEms);
                }

                let certificate = HandshakeMessageCertificate::unmarshal(&cert_body)?;
                self.verify_peer_certificate(&certificate.certificates)?;

                let ske = ServerKeyExchange::unmarshal(&ske_body)?;
                if ske.named_curve == NamedCurve::Unsupported {
                    return Err(Error::ErrInvalidNamedCurve);
                }
                if ske.algorithm.signature != self.expected_peer_signature()? {
                    return Err(Error::ErrInvalidSignatureAlgorithm);
                }
                let content = signed_key_exchange_content(
                    &self.state.local_random.marshal(),
                    &self.state.remote_random.marshal(),
                    ske.named_curve,
                    &ske.public_key,
                );
                if let Err(err) = verify_signature(
                    &self.state.peer_certificates[0],
                    ske.algorithm,
                    &content,
                    &ske.signature,
                ) {
                    let _ = self.send_alert(AlertLevel::Fatal, AlertDescription::DecryptError);
                    return Err(err);
                }
                self.state.named_curve = ske.named_curve;
                self.remote_ecdhe_public = ske.public_key;
                self.state.peer_certificates_verified = true;

                self.peer_requested_certificate = self
                    .received_messages
                    .contains_key(&HandshakeType::CertificateRequest);

                Ok(Some(Flight::Flight5))
            }
            Flight::Flight4 => {
                // Wait for the client's full second flight (ending in the
                // encrypted Finished of epoch 1)
                if self.state.remote_epoch == 0 {
                    return Ok(None);
                }
                let Some(finished_body) =
                    self.received_messages.get(&HandshakeType::Finished).cloned()
                else {
                    return Ok(None);
                };
                let Some(cert_body) =
                    self.received_messages.get(&HandshakeType::Certificate).cloned()
                else {
                    return Ok(None);
                };
                let Some(verify_body) = self
                    .received_messages
                    .get(&HandshakeType::CertificateVerify)
                    .cloned()
                else {
                    return Ok(None);
                };

                let certificate = HandshakeMessageCertificate::unmarshal(&cert_body)?;
                self.verify_peer_certificate(&certificate.certificates)?;

                let certificate_verify = CertificateVerify::unmarshal(&verify_body)?;
                let content = self.cache.pull(ORDER_THROUGH_CLIENT_KEY_EXCHANGE);
                if let Err(err) = verify_signature(
                    &self.state.peer_certificates[0],
                    certificate_verify.algorithm,
                    &content,
                    &certificate_verify.signature,
                ) {
                    let _ = self.send_alert(AlertLevel::Fatal, AlertDescription::DecryptError);
                    return Err(err);
                }
                self.state.peer_certificates_verified = true;

                let finished = Finished::unmarshal(&finished_body)?;
                let expected = prf_verify_data_client(
                    &self.state.master_secret,
                    &self.cache.pull(ORDER_THROUGH_CERTIFICATE_VERIFY),
                )?;
                if finished.verify_data != expected {
                    let _ = self.send_alert(AlertLevel::Fatal, AlertDescription::DecryptError);
                    return Err(Error::ErrVerifyDataMismatch);
                }

                Ok(Some(Flight::Flight6))
            }
            Flight::Flight5 => {
                if self.state.remote_epoch == 0 {
                    return Ok(None);
                }
                let Some(finished_body) =
                    self.received_messages.get(&HandshakeType::Finished).cloned()
                else {
                    return Ok(None);
                };

                let finished = Finished::unmarshal(&finished_body)?;
                let expected = prf_verify_data_server(
                    &self.state.master_secret,
                    &self.cache.pull(ORDER_THROUGH_CLIENT_FINISHED),
                )?;
                if finished.verify_data != expected {
                    let _ = self.send_alert(AlertLevel::Fatal, AlertDescription::DecryptError);
                    return Err(Error::ErrVerifyDataMismatch);
                }

                Ok(Some(Flight::Flight5))
            }
            Flight::Flight6 => Ok(None),
        }
    }
}
