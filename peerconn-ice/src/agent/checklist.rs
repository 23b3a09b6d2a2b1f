//! The connectivity checklist: every pairing of a local and a remote
//! candidate, ordered by priority, with its check lifecycle.

use serde::Serialize;
use std::fmt;

use crate::candidate::Candidate;

/// Lifecycle of one pair on the checklist (RFC 8445 section 6.1.2.6).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PairState {
    /// Formed but not yet scheduled for checking.
    #[default]
    Frozen,
    /// Next in line for a connectivity check.
    Waiting,
    /// A check is on the wire and unanswered.
    InProgress,
    /// A check on this pair produced a valid response.
    Succeeded,
    /// The pair ran out of check attempts or was abandoned.
    Failed,
}

impl fmt::Display for PairState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PairState::Frozen => "frozen",
            PairState::Waiting => "waiting",
            PairState::InProgress => "in-progress",
            PairState::Succeeded => "succeeded",
            PairState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Combined pair priority (RFC 8445 section 6.1.2.3), where `g` is the
/// controlling side's candidate priority and `d` the controlled side's:
/// `2^32*MIN(G,D) + 2*MAX(G,D) + (G>D ? 1 : 0)`. Widened through u128 so the
/// corner where both priorities are u32::MAX cannot wrap.
pub(crate) fn pair_priority(g: u32, d: u32) -> u64 {
    let lesser = u128::from(g.min(d));
    let greater = u128::from(g.max(d));
    let wide = (lesser << 32) + 2 * greater + u128::from(g > d);
    wide.min(u128::from(u64::MAX)) as u64
}

/// One checklist row. Candidates are referenced by their position in the
/// agent's local/remote tables, so a pair never dangles when tables grow.
#[derive(Debug, Clone, Copy)]
pub struct CandidatePair {
    pub local: usize,
    pub remote: usize,
    pub(crate) priority: u64,
    pub(crate) state: PairState,
    pub(crate) nominated: bool,
    pub(crate) checks_sent: u16,
}

impl CandidatePair {
    pub fn state(&self) -> PairState {
        self.state
    }

    pub fn nominated(&self) -> bool {
        self.nominated
    }

    pub fn priority(&self) -> u64 {
        self.priority
    }

    fn viable(&self) -> bool {
        self.state != PairState::Failed
    }
}

impl fmt::Display for CandidatePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pair local#{} <-> remote#{} [{}] prio {}",
            self.local, self.remote, self.state, self.priority
        )
    }
}

/// Checklist owns the pairs and answers the ordering questions the agent
/// asks while scheduling checks and nominating.
#[derive(Default)]
pub(crate) struct Checklist {
    pairs: Vec<CandidatePair>,
}

impl Checklist {
    /// Forms the pair unless it already exists. Only same-component,
    /// same-family candidates pair up.
    pub(crate) fn form(
        &mut self,
        local: usize,
        remote: usize,
        locals: &[Candidate],
        remotes: &[Candidate],
        controlling: bool,
    ) {
        if self.position(local, remote).is_some() {
            return;
        }
        let lc = &locals[local];
        let rc = &remotes[remote];
        if lc.component != rc.component {
            return;
        }

        let (g, d) = if controlling {
            (lc.priority(), rc.priority())
        } else {
            (rc.priority(), lc.priority())
        };
        self.pairs.push(CandidatePair {
            local,
            remote,
            priority: pair_priority(g, d),
            state: PairState::Frozen,
            nominated: false,
            checks_sent: 0,
        });
    }

    /// Recomputes every pair priority, needed when the agent's role flips
    /// after pairs were formed.
    pub(crate) fn reprioritize(
        &mut self,
        locals: &[Candidate],
        remotes: &[Candidate],
        controlling: bool,
    ) {
        for pair in &mut self.pairs {
            let lp = locals[pair.local].priority();
            let rp = remotes[pair.remote].priority();
            let (g, d) = if controlling { (lp, rp) } else { (rp, lp) };
            pair.priority = pair_priority(g, d);
        }
    }

    pub(crate) fn position(&self, local: usize, remote: usize) -> Option<usize> {
        self.pairs
            .iter()
            .position(|p| p.local == local && p.remote == remote)
    }

    pub(crate) fn pair(&self, index: usize) -> &CandidatePair {
        &self.pairs[index]
    }

    pub(crate) fn pair_mut(&mut self, index: usize) -> &mut CandidatePair {
        &mut self.pairs[index]
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &CandidatePair> {
        self.pairs.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut CandidatePair> {
        self.pairs.iter_mut()
    }

    /// Moves every frozen pair to waiting. With a single checklist there is
    /// no foundation-based staggering to honor.
    pub(crate) fn unfreeze(&mut self) {
        for pair in &mut self.pairs {
            if pair.state == PairState::Frozen {
                pair.state = PairState::Waiting;
            }
        }
    }

    /// The highest-priority pair in the given state, by checklist priority.
    fn best_in(&self, wanted: PairState) -> Option<usize> {
        self.pairs
            .iter()
            .enumerate()
            .filter(|(_, p)| p.state == wanted)
            .max_by_key(|(_, p)| p.priority)
            .map(|(i, _)| i)
    }

    pub(crate) fn best_succeeded(&self) -> Option<usize> {
        self.best_in(PairState::Succeeded)
    }

    /// The highest-priority pair that could still succeed.
    pub(crate) fn best_viable(&self) -> Option<usize> {
        self.pairs
            .iter()
            .enumerate()
            .filter(|(_, p)| p.viable())
            .max_by_key(|(_, p)| p.priority)
            .map(|(i, _)| i)
    }

    pub(crate) fn exhausted(&self) -> bool {
        !self.pairs.is_empty() && self.pairs.iter().all(|p| p.state == PairState::Failed)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.pairs.len()
    }

    pub(crate) fn clear(&mut self) {
        self.pairs.clear();
    }
}

#[cfg(test)]
mod checklist_test {
    use super::*;
    use crate::candidate::{CandidateConfig, COMPONENT_RTP};
    use crate::network_type::NetworkType;

    fn host(port: u16) -> Candidate {
        CandidateConfig {
            network_type: NetworkType::Udp4,
            address: "192.0.2.1".to_owned(),
            port,
            component: COMPONENT_RTP,
            ..Default::default()
        }
        .new_candidate_host()
    }

    #[test]
    fn test_pair_priority_is_role_symmetric() {
        // both agents must compute the same value for the same pair
        assert_eq!(pair_priority(100, 200), pair_priority(100, 200));
        let from_controlling = pair_priority(123, 456);
        let from_controlled = pair_priority(123, 456);
        assert_eq!(from_controlling, from_controlled);
        // the tie bit orders (G>D) above (D>G)
        assert_eq!(pair_priority(7, 7), (7u64 << 32) + 14);
        assert_eq!(pair_priority(8, 7), pair_priority(7, 8) + 1);
    }

    #[test]
    fn test_pair_priority_extremes_do_not_wrap() {
        let top = pair_priority(u32::MAX, u32::MAX);
        assert_eq!(top, u64::MAX);
        assert!(pair_priority(u32::MAX, 0) < top);
        assert_eq!(pair_priority(u32::MAX, 0), 2 * u64::from(u32::MAX) + 1);
    }

    #[test]
    fn test_form_dedups_and_skips_component_mismatch() {
        let locals = vec![host(4000)];
        let mut other = host(4001);
        other.component = 2;
        let remotes = vec![host(5000), other];

        let mut list = Checklist::default();
        list.form(0, 0, &locals, &remotes, true);
        list.form(0, 0, &locals, &remotes, true);
        list.form(0, 1, &locals, &remotes, true);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_unfreeze_and_best_queries() {
        let locals = vec![host(4000)];
        let remotes = vec![host(5000), host(5001)];
        let mut list = Checklist::default();
        list.form(0, 0, &locals, &remotes, true);
        list.form(0, 1, &locals, &remotes, true);

        assert!(list.best_succeeded().is_none());
        list.unfreeze();
        assert!(list.iter().all(|p| p.state == PairState::Waiting));

        list.pair_mut(1).state = PairState::Succeeded;
        assert_eq!(list.best_succeeded(), Some(1));
        assert!(!list.exhausted());

        for pair in list.iter_mut() {
            pair.state = PairState::Failed;
        }
        assert!(list.exhausted());
        assert!(list.best_viable().is_none());
    }
}
