#[cfg(test)]
mod agent_test;

pub mod agent_config;
mod checks;
pub(crate) mod checklist;

use bytes::BytesMut;
use log::{debug, info, trace, warn};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use stun::message::{Getter, Message, TransactionId, BINDING_REQUEST};
use stun::xoraddr::XorMappedAddress;

use crate::candidate::{Candidate, CandidateConfig, CandidateRelatedAddress, CandidateType, COMPONENT_RTP};
use crate::mdns::is_mdns_hostname;
use crate::network_type::NetworkType;
use crate::rand::{generate_pwd, generate_ufrag};
use crate::state::{ConnectionState, GatheringState};
use crate::url::Url;
use agent_config::{AgentConfig, Timings};
use checklist::Checklist;
use shared::error::{Error, Result};
use shared::{TaggedBytesMut, TransportContext, TransportMessage, TransportProtocol};

/// Which side of the session this agent drives (RFC 8445 section 5.1.1).
/// The controlling side nominates; the controlled side follows.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Role {
    Controlling,
    Controlled,
}

impl Role {
    pub(crate) fn name(self) -> &'static str {
        match self {
            Role::Controlling => "controlling",
            Role::Controlled => "controlled",
        }
    }
}

/// The short-term credential pair exchanged through SDP.
#[derive(Default, Clone)]
pub struct Credentials {
    pub ufrag: String,
    pub pwd: String,
}

/// A connectivity check we sent whose answer is still outstanding, keyed by
/// its STUN transaction id.
pub(crate) struct OutstandingCheck {
    pub(crate) sent_at: Instant,
    pub(crate) target: SocketAddr,
    pub(crate) nominating: bool,
}

/// A binding sent to a configured STUN server while gathering.
struct ServerBinding {
    server: SocketAddr,
    local: usize,
}

pub enum Event {
    ConnectionStateChange(ConnectionState),
    GatheringStateChange(GatheringState),
    CandidateGathered(Box<Candidate>),
    SelectedCandidatePairChange(Box<Candidate>, Box<Candidate>),
}

/// The ICE agent: candidate tables, the checklist, nomination state and the
/// STUN plumbing that drives them. Performs no I/O; datagrams and timer
/// ticks are pumped through `handle_read`/`handle_timeout` and outbound
/// traffic drained with `poll_transmit`.
pub struct Agent {
    pub(crate) role: Role,
    pub(crate) tie_breaker: u64,
    lite: bool,
    pub(crate) timings: Timings,
    permitted_types: Vec<CandidateType>,
    urls: Vec<Url>,

    pub(crate) local_credentials: Credentials,
    pub(crate) remote_credentials: Option<Credentials>,

    pub(crate) locals: Vec<Candidate>,
    pub(crate) remotes: Vec<Candidate>,
    pub(crate) checklist: Checklist,
    /// Checklist position of the pair we are nominating, once chosen.
    pub(crate) nominated: Option<usize>,
    /// Checklist position of the pair traffic flows on.
    pub(crate) selected: Option<usize>,

    pub(crate) outstanding_checks: HashMap<TransactionId, OutstandingCheck>,
    server_bindings: HashMap<TransactionId, ServerBinding>,
    gather_deadline: Option<Instant>,
    gathering_state: GatheringState,

    connection_state: ConnectionState,
    /// When the session (re)started; nomination waits count from here.
    pub(crate) session_started_at: Instant,
    /// When the agent entered Checking, for the overall failure deadline.
    checking_since: Option<Instant>,
    last_drive_at: Instant,

    pub(crate) transmits: VecDeque<TaggedBytesMut>,
    pub(crate) events: VecDeque<Event>,
}

impl Agent {
    pub fn new(config: Arc<AgentConfig>) -> Result<Self> {
        let permitted_types = if config.candidate_types.is_empty() {
            vec![
                CandidateType::Host,
                CandidateType::ServerReflexive,
                CandidateType::Relay,
            ]
        } else {
            config.candidate_types.clone()
        };

        if config.lite && permitted_types != [CandidateType::Host] {
            return Err(Error::ErrLiteUsingNonHostCandidates);
        }
        if !config.urls.is_empty()
            && !permitted_types.iter().any(|t| {
                matches!(t, CandidateType::ServerReflexive | CandidateType::Relay)
            })
        {
            return Err(Error::ErrUselessUrlsProvided);
        }

        let now = Instant::now();
        let mut agent = Agent {
            role: if config.is_controlling {
                Role::Controlling
            } else {
                Role::Controlled
            },
            tie_breaker: rand::random(),
            lite: config.lite,
            timings: config.timings.clone(),
            permitted_types,
            urls: config.urls.clone(),
            local_credentials: Credentials::default(),
            remote_credentials: None,
            locals: vec![],
            remotes: vec![],
            checklist: Checklist::default(),
            nominated: None,
            selected: None,
            outstanding_checks: HashMap::new(),
            server_bindings: HashMap::new(),
            gather_deadline: None,
            gathering_state: GatheringState::New,
            connection_state: ConnectionState::New,
            session_started_at: now,
            checking_since: None,
            last_drive_at: now,
            transmits: VecDeque::new(),
            events: VecDeque::new(),
        };

        agent.install_credentials(config.local_ufrag.clone(), config.local_pwd.clone())?;
        Ok(agent)
    }

    /// Validates and installs local credentials, generating missing ones.
    /// RFC 8445 section 5.3 requires at least 24 bits of ufrag and 128 bits
    /// of password.
    fn install_credentials(&mut self, ufrag: String, pwd: String) -> Result<()> {
        let ufrag = if ufrag.is_empty() { generate_ufrag() } else { ufrag };
        let pwd = if pwd.is_empty() { generate_pwd() } else { pwd };

        if ufrag.len() * 8 < 24 {
            return Err(Error::ErrLocalUfragInsufficientBits);
        }
        if pwd.len() * 8 < 128 {
            return Err(Error::ErrLocalPwdInsufficientBits);
        }

        self.local_credentials = Credentials { ufrag, pwd };
        Ok(())
    }

    // --- credentials and role --------------------------------------------

    pub fn set_remote_credentials(&mut self, ufrag: String, pwd: String) -> Result<()> {
        if ufrag.is_empty() {
            return Err(Error::ErrRemoteUfragEmpty);
        }
        if pwd.is_empty() {
            return Err(Error::ErrRemotePwdEmpty);
        }
        self.remote_credentials = Some(Credentials { ufrag, pwd });
        Ok(())
    }

    pub fn get_remote_credentials(&self) -> Option<&Credentials> {
        self.remote_credentials.as_ref()
    }

    pub fn get_local_credentials(&self) -> &Credentials {
        &self.local_credentials
    }

    pub fn is_controlling(&self) -> bool {
        self.role == Role::Controlling
    }

    pub fn set_controlling(&mut self, controlling: bool) {
        let role = if controlling {
            Role::Controlling
        } else {
            Role::Controlled
        };
        if role != self.role {
            self.role = role;
            self.checklist
                .reprioritize(&self.locals, &self.remotes, self.is_controlling());
        }
    }

    pub fn lite(&self) -> bool {
        self.lite
    }

    pub fn state(&self) -> ConnectionState {
        self.connection_state
    }

    pub fn gathering_state(&self) -> GatheringState {
        self.gathering_state
    }

    // --- candidates ------------------------------------------------------

    /// Adds a local candidate, pairing it against every known remote.
    pub fn add_local_candidate(&mut self, candidate: Candidate) -> Result<()> {
        if self.locals.iter().any(|c| c.equal(&candidate)) {
            return Ok(());
        }
        self.locals.push(candidate);

        let local = self.locals.len() - 1;
        for remote in 0..self.remotes.len() {
            self.checklist
                .form(local, remote, &self.locals, &self.remotes, self.is_controlling());
        }
        self.kick(Instant::now());
        Ok(())
    }

    /// Adds a remote candidate, pairing it against every known local.
    /// `.local` hostnames must have been resolved by the host's process-wide
    /// mDNS resolver before they get here.
    pub fn add_remote_candidate(&mut self, candidate: Candidate) -> Result<()> {
        if candidate.candidate_type == CandidateType::Host && is_mdns_hostname(&candidate.address)
        {
            warn!(
                "[{}]: rejecting unresolved mDNS candidate ({})",
                self.role.name(),
                candidate.address
            );
            return Err(Error::ErrMulticastDnsNotSupported);
        }

        if self.remotes.iter().any(|c| c.equal(&candidate)) {
            return Ok(());
        }
        self.remotes.push(candidate);

        let remote = self.remotes.len() - 1;
        for local in 0..self.locals.len() {
            self.checklist
                .form(local, remote, &self.locals, &self.remotes, self.is_controlling());
        }
        self.kick(Instant::now());
        Ok(())
    }

    pub fn get_local_candidates(&self) -> &[Candidate] {
        &self.locals
    }

    /// Runs a checking pass now if checks are already underway.
    fn kick(&mut self, now: Instant) {
        if self.remote_credentials.is_some() && self.connection_state != ConnectionState::New {
            self.drive(now);
        }
    }

    // --- gathering -------------------------------------------------------

    /// Starts gathering. Host candidates come from the socket addresses the
    /// embedding runtime provides; server-reflexive ones are learned by
    /// binding against the resolved STUN servers.
    pub fn gather_candidates(
        &mut self,
        local_addrs: &[SocketAddr],
        stun_servers: &[SocketAddr],
    ) -> Result<()> {
        self.set_gathering_state(GatheringState::Gathering);

        for addr in local_addrs {
            let host = CandidateConfig {
                network_type: if addr.is_ipv4() {
                    NetworkType::Udp4
                } else {
                    NetworkType::Udp6
                },
                address: addr.ip().to_string(),
                port: addr.port(),
                component: COMPONENT_RTP,
                ..Default::default()
            }
            .new_candidate_host();

            self.add_local_candidate(host.clone())?;
            self.events.push_back(Event::CandidateGathered(Box::new(host)));
        }

        let wants_srflx = self
            .permitted_types
            .contains(&CandidateType::ServerReflexive);
        if wants_srflx {
            for server in stun_servers {
                self.bind_against_server(*server)?;
            }
        }

        if self.server_bindings.is_empty() {
            self.set_gathering_state(GatheringState::Complete);
        } else {
            self.gather_deadline = Some(Instant::now() + self.timings.gather_timeout);
        }
        Ok(())
    }

    /// Sends one binding request per address-family-matching host candidate
    /// towards `server`.
    fn bind_against_server(&mut self, server: SocketAddr) -> Result<()> {
        for local in 0..self.locals.len() {
            let candidate = &self.locals[local];
            if candidate.candidate_type != CandidateType::Host
                || candidate.addr().is_ipv4() != server.is_ipv4()
            {
                continue;
            }

            let mut request = Message::new();
            request.build(&[&BINDING_REQUEST, &TransactionId::new()])?;
            self.server_bindings.insert(
                request.transaction_id,
                ServerBinding { server, local },
            );

            let local_addr = self.locals[local].addr();
            self.queue_datagram(&request.raw, local_addr, server);
        }
        Ok(())
    }

    /// A STUN server answered: the mapped address becomes a
    /// server-reflexive candidate related to the host it was learned from.
    fn complete_server_binding(&mut self, message: &Message, binding: ServerBinding) -> Result<()> {
        let mut mapped = XorMappedAddress::default();
        mapped.get_from(message)?;

        let base = &self.locals[binding.local];
        let srflx = CandidateConfig {
            network_type: base.network_type,
            address: mapped.ip.to_string(),
            port: mapped.port,
            component: base.component,
            related_address: Some(CandidateRelatedAddress {
                address: base.address.clone(),
                port: base.port,
            }),
            ..Default::default()
        }
        .new_candidate_server_reflexive();

        info!(
            "[{}]: learned server-reflexive candidate {} via {}",
            self.role.name(),
            srflx,
            binding.server
        );
        self.add_local_candidate(srflx.clone())?;
        self.events.push_back(Event::CandidateGathered(Box::new(srflx)));

        if self.server_bindings.is_empty() {
            self.gather_deadline = None;
            self.set_gathering_state(GatheringState::Complete);
        }
        Ok(())
    }

    fn set_gathering_state(&mut self, state: GatheringState) {
        if self.gathering_state != state {
            self.gathering_state = state;
            self.events.push_back(Event::GatheringStateChange(state));
        }
    }

    // --- lifecycle -------------------------------------------------------

    /// Starts connectivity checks against the remote's credentials.
    pub fn start_connectivity_checks(
        &mut self,
        is_controlling: bool,
        remote_ufrag: String,
        remote_pwd: String,
    ) -> Result<()> {
        debug!(
            "starting checks: role {}, remote ufrag {remote_ufrag}",
            if is_controlling { "controlling" } else { "controlled" },
        );
        self.set_remote_credentials(remote_ufrag, remote_pwd)?;
        self.set_controlling(is_controlling);
        self.session_started_at = Instant::now();
        self.nominated = None;

        self.set_connection_state(ConnectionState::Checking);
        self.kick(Instant::now());
        Ok(())
    }

    /// Restarts the session: fresh credentials (generated when empty), the
    /// checklist and remote table purged, gathering state rewound. Local
    /// candidates survive when `keep_local_candidates` is set.
    pub fn restart(
        &mut self,
        ufrag: String,
        pwd: String,
        keep_local_candidates: bool,
    ) -> Result<()> {
        self.install_credentials(ufrag, pwd)?;
        self.remote_credentials = None;

        if !keep_local_candidates {
            self.locals.clear();
        }
        self.remotes.clear();
        self.checklist.clear();
        self.nominated = None;
        self.selected = None;
        self.outstanding_checks.clear();
        self.server_bindings.clear();
        self.gather_deadline = None;
        self.gathering_state = GatheringState::New;
        self.session_started_at = Instant::now();
        self.checking_since = None;

        if self.connection_state != ConnectionState::New {
            // the failure deadline counts from the restart even when the
            // state was already Checking
            self.checking_since = Some(Instant::now());
            self.set_connection_state(ConnectionState::Checking);
        }
        Ok(())
    }

    /// Shuts the agent down; nothing is transmitted or emitted afterwards.
    pub fn close(&mut self) -> Result<()> {
        self.locals.clear();
        self.remotes.clear();
        self.checklist.clear();
        self.nominated = None;
        self.selected = None;
        self.outstanding_checks.clear();
        self.set_connection_state(ConnectionState::Closed);
        Ok(())
    }

    pub(crate) fn set_connection_state(&mut self, state: ConnectionState) {
        if self.connection_state == state {
            return;
        }
        if state == ConnectionState::Failed {
            // a failed agent keeps nothing; a restart rebuilds from scratch
            self.selected = None;
            self.nominated = None;
            self.checklist.clear();
            self.locals.clear();
            self.remotes.clear();
        }
        if state == ConnectionState::Checking {
            self.checking_since = Some(Instant::now());
        }

        info!("[{}]: connection state -> {}", self.role.name(), state);
        self.connection_state = state;
        self.events.push_back(Event::ConnectionStateChange(state));
    }

    /// Promotes a pair to selected, announcing the change.
    pub(crate) fn select_pair(&mut self, index: usize) {
        if self.selected == Some(index) {
            return;
        }
        self.checklist.pair_mut(index).nominated = true;
        self.selected = Some(index);

        let pair = *self.checklist.pair(index);
        trace!("[{}]: selected {}", self.role.name(), pair);
        self.set_connection_state(ConnectionState::Connected);
        self.events.push_back(Event::SelectedCandidatePairChange(
            Box::new(self.locals[pair.local].clone()),
            Box::new(self.remotes[pair.remote].clone()),
        ));
    }

    // --- selected pair views ---------------------------------------------

    /// The selected (local, remote) candidates, once nomination concluded.
    pub fn get_selected_candidate_pair(&self) -> Option<(Candidate, Candidate)> {
        let index = self.selected?;
        let pair = self.checklist.pair(index);
        Some((
            self.locals[pair.local].clone(),
            self.remotes[pair.remote].clone(),
        ))
    }

    /// The transport context of the selected pair, for sending non-STUN
    /// traffic (DTLS, SRTP).
    pub fn selected_transport(&self) -> Option<TransportContext> {
        let index = self.selected?;
        let pair = self.checklist.pair(index);
        Some(TransportContext {
            local_addr: self.locals[pair.local].addr(),
            peer_addr: self.remotes[pair.remote].addr(),
            ecn: None,
            transport_protocol: TransportProtocol::UDP,
        })
    }

    // --- I/O surface -----------------------------------------------------

    /// Feeds one inbound datagram that was classified as STUN (or as
    /// unknown traffic needing source validation).
    pub fn handle_read(&mut self, msg: TaggedBytesMut) -> Result<()> {
        let Some(local) = self.find_local(msg.transport.local_addr) else {
            warn!(
                "[{}]: dropping datagram for unknown local address {}",
                self.role.name(),
                msg.transport.local_addr
            );
            return Err(Error::ErrUnhandledStunPacket);
        };
        let from = msg.transport.peer_addr;

        if !stun::message::is_message(&msg.message) {
            // non-STUN traffic only validates liveness of a known remote
            return match self.find_remote(from) {
                Some(remote) => {
                    self.remotes[remote].seen(false);
                    Err(Error::ErrNonStunMessage)
                }
                None => {
                    warn!(
                        "[{}]: non-STUN datagram from unknown source {from}",
                        self.role.name()
                    );
                    Err(Error::ErrNonStunMessage)
                }
            };
        }

        let mut message = Message {
            raw: msg.message.to_vec(),
            ..Message::default()
        };
        if let Err(err) = message.decode() {
            warn!(
                "[{}]: undecodable STUN from {from}: {err}",
                self.role.name()
            );
            return Err(err);
        }

        // gathering answers come from servers, not from remote candidates
        if let Some(binding) = self.server_bindings.remove(&message.transaction_id) {
            if binding.server == from {
                return self.complete_server_binding(&message, binding);
            }
            self.server_bindings.insert(message.transaction_id, binding);
        }

        self.on_stun_message(&mut message, local, from)
    }

    pub fn poll_transmit(&mut self) -> Option<TaggedBytesMut> {
        self.transmits.pop_front()
    }

    pub fn poll_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    /// Timer tick: expires gathering and stale transactions, then drives
    /// the checklist.
    pub fn handle_timeout(&mut self, now: Instant) {
        if let Some(deadline) = self.gather_deadline {
            if now >= deadline {
                self.server_bindings.clear();
                self.gather_deadline = None;
                self.set_gathering_state(GatheringState::Complete);
            }
        }

        if self.remote_credentials.is_some() && self.connection_state != ConnectionState::New {
            self.drive(now);
        }
        self.last_drive_at = now;
    }

    /// The earliest instant `handle_timeout` wants to run again.
    pub fn poll_timeout(&self) -> Option<Instant> {
        let mut deadline = self.gather_deadline;

        let active = self.remote_credentials.is_some()
            && !matches!(
                self.connection_state,
                ConnectionState::New | ConnectionState::Failed | ConnectionState::Closed
            );
        if active {
            let next = self.last_drive_at + self.wake_interval();
            deadline = Some(deadline.map_or(next, |d| d.min(next)));
        }

        deadline
    }

    fn wake_interval(&self) -> Duration {
        let base = match self.connection_state {
            ConnectionState::Connected | ConnectionState::Disconnected
                if !self.timings.keepalive_interval.is_zero() =>
            {
                self.timings.keepalive_interval
            }
            _ => self.timings.check_interval,
        };
        // never sleep past the failure deadlines
        let mut interval = base;
        for bound in [self.timings.disconnected_timeout, self.timings.failed_timeout] {
            if !bound.is_zero() {
                interval = interval.min(bound);
            }
        }
        interval
    }

    // --- lookups and output ----------------------------------------------

    pub(crate) fn find_local(&self, addr: SocketAddr) -> Option<usize> {
        self.locals.iter().position(|c| c.addr() == addr)
    }

    pub(crate) fn find_remote(&self, addr: SocketAddr) -> Option<usize> {
        self.remotes.iter().position(|c| c.addr() == addr)
    }

    pub(crate) fn queue_datagram(&mut self, raw: &[u8], local: SocketAddr, peer: SocketAddr) {
        self.transmits.push_back(TransportMessage {
            now: Instant::now(),
            transport: TransportContext {
                local_addr: local,
                peer_addr: peer,
                ecn: None,
                transport_protocol: TransportProtocol::UDP,
            },
            message: BytesMut::from(raw),
        });
    }

    /// The overall failure deadline while still checking: disconnected plus
    /// failed timeout with no pair selected means the session cannot form.
    pub(crate) fn checking_deadline_passed(&self, now: Instant) -> bool {
        let Some(since) = self.checking_since else {
            return false;
        };
        let budget = self.timings.disconnected_timeout + self.timings.failed_timeout;
        !budget.is_zero() && now.saturating_duration_since(since) > budget
    }
}
