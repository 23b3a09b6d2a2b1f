use super::*;

fn host_candidate(addr: &str) -> Candidate {
    let sock: SocketAddr = addr.parse().unwrap();
    CandidateConfig {
        network_type: NetworkType::Udp4,
        address: sock.ip().to_string(),
        port: sock.port(),
        component: COMPONENT_RTP,
        ..Default::default()
    }
    .new_candidate_host()
}

fn new_agent(is_controlling: bool) -> Agent {
    Agent::new(Arc::new(AgentConfig {
        is_controlling,
        ..Default::default()
    }))
    .expect("agent")
}

/// Shuttles every queued transmit of `from` into `to`, swapping the transport
/// context the way a UDP socket pair would.
fn pump(from: &mut Agent, to: &mut Agent) -> usize {
    let mut n = 0;
    while let Some(t) = from.poll_transmit() {
        let _ = to.handle_read(TransportMessage {
            now: Instant::now(),
            transport: TransportContext {
                local_addr: t.transport.peer_addr,
                peer_addr: t.transport.local_addr,
                ecn: None,
                transport_protocol: TransportProtocol::UDP,
            },
            message: t.message,
        });
        n += 1;
    }
    n
}

#[test]
fn test_agent_requires_min_credential_lengths() {
    let mut agent = new_agent(true);
    assert_eq!(
        agent.restart("ab".to_owned(), String::new(), false),
        Err(Error::ErrLocalUfragInsufficientBits)
    );
    assert_eq!(
        agent.restart(String::new(), "short".to_owned(), false),
        Err(Error::ErrLocalPwdInsufficientBits)
    );
}

#[test]
fn test_remote_credentials_must_not_be_empty() {
    let mut agent = new_agent(true);
    assert_eq!(
        agent.set_remote_credentials(String::new(), "pwdpwdpwdpwdpwdp".to_owned()),
        Err(Error::ErrRemoteUfragEmpty)
    );
    assert_eq!(
        agent.set_remote_credentials("frag".to_owned(), String::new()),
        Err(Error::ErrRemotePwdEmpty)
    );
}

#[test]
fn test_mdns_remote_candidate_rejected_without_resolver() {
    let mut agent = new_agent(false);
    let mut c = host_candidate("127.0.0.1:4000");
    c.address = "a2f61e5c-1234.local".to_owned();
    assert_eq!(
        agent.add_remote_candidate(c),
        Err(Error::ErrMulticastDnsNotSupported)
    );
}

#[test]
fn test_gathering_without_stun_completes_immediately() {
    let mut agent = new_agent(true);
    agent
        .gather_candidates(&["127.0.0.1:5600".parse().unwrap()], &[])
        .expect("gather");
    assert_eq!(agent.gathering_state(), GatheringState::Complete);

    let mut gathered = 0;
    let mut complete = false;
    while let Some(event) = agent.poll_event() {
        match event {
            Event::CandidateGathered(_) => gathered += 1,
            Event::GatheringStateChange(GatheringState::Complete) => complete = true,
            _ => {}
        }
    }
    assert_eq!(gathered, 1);
    assert!(complete);
}

#[test]
fn test_connectivity_and_nomination() {
    let mut controlling = new_agent(true);
    let mut controlled = new_agent(false);

    controlling
        .add_local_candidate(host_candidate("127.0.0.1:4001"))
        .unwrap();
    controlled
        .add_local_candidate(host_candidate("127.0.0.1:4002"))
        .unwrap();

    controlling
        .add_remote_candidate(host_candidate("127.0.0.1:4002"))
        .unwrap();
    controlled
        .add_remote_candidate(host_candidate("127.0.0.1:4001"))
        .unwrap();

    let controlled_creds = controlled.get_local_credentials().clone();
    let controlling_creds = controlling.get_local_credentials().clone();

    controlling
        .start_connectivity_checks(true, controlled_creds.ufrag, controlled_creds.pwd)
        .unwrap();
    controlled
        .start_connectivity_checks(false, controlling_creds.ufrag, controlling_creds.pwd)
        .unwrap();

    for _ in 0..20 {
        pump(&mut controlling, &mut controlled);
        pump(&mut controlled, &mut controlling);
        controlling.handle_timeout(Instant::now());
        controlled.handle_timeout(Instant::now());

        if controlling.state() == ConnectionState::Connected
            && controlled.state() == ConnectionState::Connected
        {
            break;
        }
    }

    assert_eq!(controlling.state(), ConnectionState::Connected);
    assert_eq!(controlled.state(), ConnectionState::Connected);
    assert!(controlling.get_selected_candidate_pair().is_some());
    assert!(controlled.get_selected_candidate_pair().is_some());

    let (local, remote) = controlling.get_selected_candidate_pair().unwrap();
    assert_eq!(local.port, 4001);
    assert_eq!(remote.port, 4002);
}

#[test]
fn test_restart_regenerates_credentials_and_purges_pairs() {
    let mut agent = new_agent(true);
    agent
        .add_local_candidate(host_candidate("127.0.0.1:4100"))
        .unwrap();
    agent
        .add_remote_candidate(host_candidate("127.0.0.1:4200"))
        .unwrap();
    agent
        .set_remote_credentials("remoteremote".to_owned(), "pwdpwdpwdpwdpwdpwdpwd".to_owned())
        .unwrap();
    assert!(!agent.checklist.is_empty());

    let before = agent.get_local_credentials().clone();
    agent.restart(String::new(), String::new(), true).unwrap();
    let after = agent.get_local_credentials().clone();

    assert_ne!(before.ufrag, after.ufrag);
    assert_ne!(before.pwd, after.pwd);
    assert!(agent.checklist.is_empty());
    assert!(agent.get_remote_credentials().is_none());
    // keep_local_candidates preserved the host candidate
    assert_eq!(agent.get_local_candidates().len(), 1);
}

#[test]
fn test_inbound_non_stun_from_unknown_source_discarded() {
    let mut agent = new_agent(false);
    agent
        .add_local_candidate(host_candidate("127.0.0.1:4300"))
        .unwrap();

    let res = agent.handle_read(TransportMessage {
        now: Instant::now(),
        transport: TransportContext {
            local_addr: "127.0.0.1:4300".parse().unwrap(),
            peer_addr: "127.0.0.1:9999".parse().unwrap(),
            ecn: None,
            transport_protocol: TransportProtocol::UDP,
        },
        message: BytesMut::from(&b"not a stun packet"[..]),
    });
    assert_eq!(res, Err(Error::ErrNonStunMessage));
}

#[test]
fn test_role_flip_reprioritizes_pairs() {
    let mut agent = new_agent(true);
    agent
        .add_local_candidate(host_candidate("127.0.0.1:4400"))
        .unwrap();
    agent
        .add_remote_candidate(host_candidate("127.0.0.1:4500"))
        .unwrap();

    let before: Vec<u64> = agent.checklist.iter().map(|p| p.priority()).collect();
    agent.set_controlling(false);
    let after: Vec<u64> = agent.checklist.iter().map(|p| p.priority()).collect();

    // same candidates from the other role must agree on pair priority
    assert_eq!(before, after);
    assert!(!agent.is_controlling());
}
