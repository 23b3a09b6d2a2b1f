//! Connectivity checks and nomination.
//!
//! One builder produces every outbound check; role-specific behavior
//! (nomination on the controlling side, USE-CANDIDATE acceptance and
//! triggered checks on the controlled side) hangs off explicit matches on
//! [super::Role] rather than separate code paths per role.

use log::{debug, trace, warn};
use std::net::SocketAddr;
use std::time::Instant;

use stun::attributes::{
    AttrControlled, AttrControlling, PriorityAttr, UseCandidateAttr, ATTR_ICE_CONTROLLED,
    ATTR_ICE_CONTROLLING, ATTR_USERNAME, ATTR_USE_CANDIDATE,
};
use stun::fingerprint::FINGERPRINT;
use stun::integrity::MessageIntegrity;
use stun::message::{
    Getter, Message, MessageClass, Method, Setter, TransactionId, BINDING_REQUEST,
    BINDING_SUCCESS,
};
use stun::textattrs::Username;
use stun::xoraddr::XorMappedAddress;

use crate::agent::checklist::PairState;
use crate::agent::{Agent, Credentials, OutstandingCheck, Role};
use crate::candidate::CandidateConfig;
use crate::network_type::NetworkType;
use crate::state::ConnectionState;
use shared::error::{Error, Result};

impl Agent {
    /// One pass over the session: expire stale transactions, watch the
    /// failure deadline, then either maintain the selected pair or keep
    /// checking and nominating.
    pub(crate) fn drive(&mut self, now: Instant) {
        self.expire_outstanding(now);

        if matches!(
            self.state(),
            ConnectionState::Failed | ConnectionState::Closed
        ) {
            return;
        }

        if self.selected.is_none() && self.checking_deadline_passed(now) {
            self.set_connection_state(ConnectionState::Failed);
            return;
        }

        if self.selected.is_some() {
            self.audit_selected_pair(now);
            if self.selected.is_some() && self.state() == ConnectionState::Connected {
                self.keepalive(now);
            }
            return;
        }

        match self.role {
            Role::Controlling => {
                if let Some(index) = self.nominated {
                    // keep asserting the nomination until its answer lands
                    self.send_pair_check(index, true, now);
                } else if !self.try_nominate(now) {
                    self.schedule_checks(now);
                }
            }
            Role::Controlled => {
                if self.lite() {
                    // lite agents only answer checks
                    return;
                }
                self.schedule_checks(now);
            }
        }
    }

    /// Sends a check on every pair that is due one, writing off pairs that
    /// ran out of attempts.
    fn schedule_checks(&mut self, now: Instant) {
        self.checklist.unfreeze();
        if self.checklist.is_empty() {
            trace!("[{}]: nothing to check yet", self.role.name());
            return;
        }

        let budget = self.timings.max_checks_per_pair;
        let mut due = vec![];
        for (index, pair) in self.checklist.iter_mut().enumerate() {
            match pair.state {
                PairState::Waiting | PairState::InProgress => {
                    if pair.checks_sent >= budget {
                        trace!("check budget spent on pair #{index}, marking failed");
                        pair.state = PairState::Failed;
                    } else {
                        due.push(index);
                    }
                }
                _ => {}
            }
        }
        for index in due {
            self.send_pair_check(index, false, now);
        }

        if self.checklist.exhausted() {
            self.set_connection_state(ConnectionState::Failed);
        }
    }

    /// Nominates the best succeeded pair once nothing better can still win
    /// and its candidates settled long enough. Returns whether a nomination
    /// went out.
    fn try_nominate(&mut self, now: Instant) -> bool {
        let Some(index) = self.checklist.best_succeeded() else {
            return false;
        };
        // a higher-priority pair still in flight gets its chance first
        if self.checklist.best_viable() != Some(index) {
            return false;
        }
        if !self.settled_for_nomination(index, now) {
            return false;
        }

        trace!(
            "[{}]: nominating {}",
            self.role.name(),
            self.checklist.pair(index)
        );
        self.checklist.pair_mut(index).nominated = true;
        self.nominated = Some(index);
        self.send_pair_check(index, true, now);
        true
    }

    /// Reflexive and relayed candidates wait out their settle time before
    /// nomination, so a better pair can still surface.
    fn settled_for_nomination(&self, index: usize, now: Instant) -> bool {
        let pair = self.checklist.pair(index);
        let age = now.saturating_duration_since(self.session_started_at);
        age >= self
            .timings
            .nomination_wait(self.locals[pair.local].candidate_type)
            && age >= self
                .timings
                .nomination_wait(self.remotes[pair.remote].candidate_type)
    }

    /// Builds and sends one connectivity check on a pair, registering the
    /// transaction. USE-CANDIDATE rides along when `nominating`.
    pub(crate) fn send_pair_check(&mut self, index: usize, nominating: bool, now: Instant) {
        let Some(credentials) = self.remote_credentials.clone() else {
            return;
        };
        let pair = *self.checklist.pair(index);
        let priority = self.locals[pair.local].priority();

        let message = match self.build_check(&credentials, priority, nominating) {
            Ok(m) => m,
            Err(err) => {
                warn!("[{}]: failed to build check: {err}", self.role.name());
                return;
            }
        };

        let target = self.remotes[pair.remote].addr();
        self.outstanding_checks.insert(
            message.transaction_id,
            OutstandingCheck {
                sent_at: now,
                target,
                nominating,
            },
        );

        {
            let pair = self.checklist.pair_mut(index);
            pair.checks_sent += 1;
            if matches!(pair.state, PairState::Frozen | PairState::Waiting) {
                pair.state = PairState::InProgress;
            }
        }

        trace!(
            "[{}]: check{} -> {}",
            self.role.name(),
            if nominating { " (nominating)" } else { "" },
            target
        );
        let local_addr = self.locals[pair.local].addr();
        self.queue_datagram(&message.raw, local_addr, target);
        self.locals[pair.local].seen(true);
    }

    fn build_check(
        &self,
        credentials: &Credentials,
        priority: u32,
        nominating: bool,
    ) -> Result<Message> {
        // USERNAME is "their-ufrag:our-ufrag" on outbound checks
        let username = format!("{}:{}", credentials.ufrag, self.local_credentials.ufrag);

        let mut message = Message::new();
        BINDING_REQUEST.add_to(&mut message)?;
        TransactionId::new().add_to(&mut message)?;
        Username::new(ATTR_USERNAME, username).add_to(&mut message)?;
        match self.role {
            Role::Controlling => {
                AttrControlling(self.tie_breaker).add_to(&mut message)?;
                if nominating {
                    UseCandidateAttr.add_to(&mut message)?;
                }
            }
            Role::Controlled => {
                AttrControlled(self.tie_breaker).add_to(&mut message)?;
            }
        }
        PriorityAttr(priority).add_to(&mut message)?;
        MessageIntegrity::new_short_term_integrity(credentials.pwd.clone())
            .add_to(&mut message)?;
        FINGERPRINT.add_to(&mut message)?;
        Ok(message)
    }

    /// Forgets checks whose answer is overdue.
    fn expire_outstanding(&mut self, now: Instant) {
        let ttl = self.timings.check_ttl;
        if ttl.is_zero() {
            return;
        }
        self.outstanding_checks
            .retain(|_, check| now.saturating_duration_since(check.sent_at) < ttl);
    }

    /// Watches the selected pair for silence and walks the connection state
    /// accordingly.
    fn audit_selected_pair(&mut self, now: Instant) {
        let Some(index) = self.selected else {
            return;
        };
        let remote = self.checklist.pair(index).remote;
        let silence = now.saturating_duration_since(self.remotes[remote].last_received());

        let disconnected = self.timings.disconnected_timeout;
        let give_up = if self.timings.failed_timeout.is_zero() {
            self.timings.failed_timeout
        } else {
            disconnected + self.timings.failed_timeout
        };

        if !give_up.is_zero() && silence > give_up {
            self.set_connection_state(ConnectionState::Failed);
        } else if !disconnected.is_zero() && silence > disconnected {
            self.set_connection_state(ConnectionState::Disconnected);
        } else {
            self.set_connection_state(ConnectionState::Connected);
        }
    }

    /// Consent freshness (RFC 7675): a full binding request, not an
    /// indication, whenever the selected pair went quiet in either
    /// direction.
    fn keepalive(&mut self, now: Instant) {
        let interval = self.timings.keepalive_interval;
        if interval.is_zero() {
            return;
        }
        let Some(index) = self.selected else {
            return;
        };
        let pair = *self.checklist.pair(index);
        let idle_out = now.saturating_duration_since(self.locals[pair.local].last_sent());
        let idle_in = now.saturating_duration_since(self.remotes[pair.remote].last_received());
        if idle_out > interval || idle_in > interval {
            self.send_pair_check(index, false, now);
        }
    }

    // --- inbound ---------------------------------------------------------

    /// Dispatches a decoded STUN message that arrived on local candidate
    /// `local` from `from`.
    pub(crate) fn on_stun_message(
        &mut self,
        message: &mut Message,
        local: usize,
        from: SocketAddr,
    ) -> Result<()> {
        if message.typ.method != Method::Binding {
            return Err(Error::ErrUnhandledStunPacket);
        }
        match message.typ.class {
            MessageClass::Request => self.on_check_request(message, local, from),
            MessageClass::SuccessResponse => self.on_check_response(message, local, from),
            MessageClass::Indication => {
                if let Some(remote) = self.find_remote(from) {
                    self.remotes[remote].seen(false);
                }
                Ok(())
            }
            MessageClass::ErrorResponse => Err(Error::ErrUnhandledStunPacket),
        }
    }

    /// A request carrying the wrong control attribute means both sides
    /// believe they hold the same role (RFC 8445 section 7.3.1.1).
    fn request_conflicts_with_role(&self, message: &Message) -> bool {
        match self.role {
            Role::Controlling => {
                message.contains(ATTR_ICE_CONTROLLING) || message.contains(ATTR_USE_CANDIDATE)
            }
            Role::Controlled => message.contains(ATTR_ICE_CONTROLLED),
        }
    }

    fn verify_request_credentials(&self, message: &mut Message) -> Result<()> {
        let credentials = self
            .remote_credentials
            .as_ref()
            .ok_or(Error::ErrPasswordEmpty)?;

        // inbound requests carry "our-ufrag:their-ufrag"
        let expected = format!(
            "{}:{}",
            self.local_credentials.ufrag, credentials.ufrag
        );
        let mut username = Username::new(ATTR_USERNAME, String::new());
        username.get_from(message)?;
        if username.text != expected {
            return Err(Error::ErrMismatchUsername);
        }

        MessageIntegrity::new_short_term_integrity(self.local_credentials.pwd.clone())
            .check(message)
    }

    fn on_check_request(
        &mut self,
        message: &mut Message,
        local: usize,
        from: SocketAddr,
    ) -> Result<()> {
        if self.request_conflicts_with_role(message) {
            debug!(
                "[{}]: role conflict in request from {from}",
                self.role.name()
            );
            return Err(Error::ErrUnexpectedStunRequestMessage);
        }
        if let Err(err) = self.verify_request_credentials(message) {
            warn!(
                "[{}]: rejecting check from {from}: {err}",
                self.role.name()
            );
            return Err(err);
        }

        // a valid check from an unknown source reveals a peer-reflexive
        // candidate (RFC 8445 section 7.3.1.3)
        let remote = match self.find_remote(from) {
            Some(remote) => remote,
            None => {
                debug!(
                    "[{}]: learning peer-reflexive candidate at {from}",
                    self.role.name()
                );
                self.learn_peer_reflexive(from, self.locals[local].component)
            }
        };
        self.remotes[remote].seen(false);

        self.answer_check(message, local, remote)?;

        let Some(index) = self.checklist.position(local, remote) else {
            return Ok(());
        };

        match self.role {
            Role::Controlling => {
                // the working reverse path may have made this pair ripe
                if self.selected.is_none() && self.nominated.is_none() {
                    self.try_nominate(Instant::now());
                }
            }
            Role::Controlled => {
                let succeeded = self.checklist.pair(index).state == PairState::Succeeded;
                if message.contains(ATTR_USE_CANDIDATE) && succeeded {
                    // accepting the nomination (RFC 8445 section 7.3.1.5)
                    if self.selected.is_none() {
                        self.select_pair(index);
                    }
                } else if !succeeded {
                    // triggered check (RFC 8445 section 7.3.1.4)
                    self.send_pair_check(index, false, Instant::now());
                }
            }
        }
        Ok(())
    }

    /// Answers a valid check with a binding success carrying the source
    /// address the request arrived from.
    fn answer_check(&mut self, request: &Message, local: usize, remote: usize) -> Result<()> {
        let peer = self.remotes[remote].addr();

        let mut response = Message::new();
        BINDING_SUCCESS.add_to(&mut response)?;
        request.add_to(&mut response)?; // adopt the request's transaction id
        XorMappedAddress {
            ip: peer.ip(),
            port: peer.port(),
        }
        .add_to(&mut response)?;
        MessageIntegrity::new_short_term_integrity(self.local_credentials.pwd.clone())
            .add_to(&mut response)?;
        FINGERPRINT.add_to(&mut response)?;

        let local_addr = self.locals[local].addr();
        self.queue_datagram(&response.raw, local_addr, peer);
        self.locals[local].seen(true);
        Ok(())
    }

    fn on_check_response(
        &mut self,
        message: &mut Message,
        local: usize,
        from: SocketAddr,
    ) -> Result<()> {
        let credentials = self
            .remote_credentials
            .clone()
            .ok_or(Error::ErrPasswordEmpty)?;
        MessageIntegrity::new_short_term_integrity(credentials.pwd).check(message)?;

        let Some(check) = self.outstanding_checks.remove(&message.transaction_id) else {
            warn!(
                "[{}]: response with unknown transaction from {from}",
                self.role.name()
            );
            return Err(Error::ErrUnhandledStunPacket);
        };
        if check.target != from {
            // answered from a different address than we checked: a
            // symmetric NAT is rewriting the path, distrust the pair
            debug!(
                "[{}]: response source {from} does not match check target {}",
                self.role.name(),
                check.target
            );
            return Ok(());
        }

        let Some(remote) = self.find_remote(from) else {
            return Err(Error::ErrUnhandledStunPacket);
        };
        self.remotes[remote].seen(false);

        let Some(index) = self.checklist.position(local, remote) else {
            warn!("[{}]: response for an unformed pair", self.role.name());
            return Ok(());
        };
        self.checklist.pair_mut(index).state = PairState::Succeeded;
        trace!(
            "[{}]: {} succeeded",
            self.role.name(),
            self.checklist.pair(index)
        );

        if self.role == Role::Controlling && self.selected.is_none() {
            if check.nominating {
                self.select_pair(index);
            } else {
                self.try_nominate(Instant::now());
            }
        }
        Ok(())
    }

    fn learn_peer_reflexive(&mut self, from: SocketAddr, component: u16) -> usize {
        let prflx = CandidateConfig {
            network_type: if from.is_ipv4() {
                NetworkType::Udp4
            } else {
                NetworkType::Udp6
            },
            address: from.ip().to_string(),
            port: from.port(),
            component,
            ..Default::default()
        }
        .new_candidate_peer_reflexive();

        self.remotes.push(prflx);
        let remote = self.remotes.len() - 1;
        for local in 0..self.locals.len() {
            self.checklist
                .form(local, remote, &self.locals, &self.remotes, self.is_controlling());
        }
        remote
    }
}
