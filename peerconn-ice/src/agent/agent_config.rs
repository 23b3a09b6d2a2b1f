use std::time::Duration;

use crate::candidate::CandidateType;
use crate::url::Url;

/// Timing knobs of the agent. The defaults suit a trickling media session
/// over the public internet.
#[derive(Debug, Clone)]
pub struct Timings {
    /// How often the checklist is driven while connecting.
    pub check_interval: Duration,
    /// Consent-freshness keepalive cadence on the selected pair (RFC 7675);
    /// zero disables keepalives.
    pub keepalive_interval: Duration,
    /// Silence on the selected pair before the agent reports disconnected.
    pub disconnected_timeout: Duration,
    /// Further silence (on top of disconnected) before the agent fails.
    pub failed_timeout: Duration,
    /// Checks sent on one pair before it is written off.
    pub max_checks_per_pair: u16,
    /// How long an in-flight check may wait for its response before the
    /// transaction is forgotten.
    pub check_ttl: Duration,
    /// How long unanswered server bindings may hold gathering open.
    pub gather_timeout: Duration,
    /// Minimum session age before a candidate of each type may be
    /// nominated; reflexive and relayed candidates wait longer so better
    /// pairs get a chance to surface first.
    pub host_nomination_wait: Duration,
    pub srflx_nomination_wait: Duration,
    pub prflx_nomination_wait: Duration,
    pub relay_nomination_wait: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Timings {
            check_interval: Duration::from_millis(200),
            keepalive_interval: Duration::from_secs(2),
            disconnected_timeout: Duration::from_secs(5),
            failed_timeout: Duration::from_secs(25),
            max_checks_per_pair: 7,
            check_ttl: Duration::from_secs(4),
            gather_timeout: Duration::from_secs(2),
            host_nomination_wait: Duration::ZERO,
            srflx_nomination_wait: Duration::from_millis(500),
            prflx_nomination_wait: Duration::from_millis(1000),
            relay_nomination_wait: Duration::from_millis(2000),
        }
    }
}

impl Timings {
    pub(crate) fn nomination_wait(&self, typ: CandidateType) -> Duration {
        match typ {
            CandidateType::Host => self.host_nomination_wait,
            CandidateType::ServerReflexive => self.srflx_nomination_wait,
            CandidateType::PeerReflexive => self.prflx_nomination_wait,
            CandidateType::Relay | CandidateType::Unspecified => self.relay_nomination_wait,
        }
    }
}

/// Construction options for [crate::Agent].
#[derive(Default, Clone)]
pub struct AgentConfig {
    /// STUN/TURN servers consulted while gathering.
    pub urls: Vec<Url>,

    /// Local credentials; empty strings mean freshly generated ones.
    pub local_ufrag: String,
    pub local_pwd: String,

    /// Whether this agent starts out controlling the session.
    pub is_controlling: bool,

    /// Lite agents answer checks but never originate them and only offer
    /// host candidates (RFC 8445 section 2.5).
    pub lite: bool,

    /// Candidate types this agent gathers and accepts; empty means all.
    pub candidate_types: Vec<CandidateType>,

    pub timings: Timings,
}
