use super::*;

#[test]
fn test_candidate_priority() {
    let host = CandidateConfig {
        network_type: NetworkType::Udp4,
        address: "192.168.1.2".to_owned(),
        port: 5000,
        component: COMPONENT_RTP,
        ..Default::default()
    }
    .new_candidate_host();
    assert_eq!(host.priority(), (126 << 24) + (65535 << 8) + 255);

    let srflx = CandidateConfig {
        network_type: NetworkType::Udp4,
        address: "1.2.3.4".to_owned(),
        port: 5000,
        component: COMPONENT_RTP,
        ..Default::default()
    }
    .new_candidate_server_reflexive();
    assert!(host.priority() > srflx.priority());
}

#[test]
fn test_candidate_marshal_unmarshal_roundtrip() {
    let c = CandidateConfig {
        network_type: NetworkType::Udp4,
        address: "10.0.0.1".to_owned(),
        port: 53421,
        component: COMPONENT_RTP,
        generation: 2,
        ..Default::default()
    }
    .new_candidate_host();

    let line = c.marshal();
    let parsed = unmarshal_candidate(&line).expect("unmarshal");
    assert!(parsed.equal(&c));
    assert_eq!(parsed.generation, 2);
    assert_eq!(parsed.priority(), c.priority());
    assert_eq!(parsed.foundation(), c.foundation());
}

#[test]
fn test_unmarshal_srflx_with_related() {
    let raw = "842163049 1 udp 1677729535 1.2.3.4 5678 typ srflx raddr 192.168.1.2 rport 5000 generation 0";
    let c = unmarshal_candidate(raw).expect("unmarshal");
    assert_eq!(c.candidate_type, CandidateType::ServerReflexive);
    assert_eq!(c.address, "1.2.3.4");
    assert_eq!(c.port, 5678);
    assert_eq!(
        c.related_address,
        Some(CandidateRelatedAddress {
            address: "192.168.1.2".to_owned(),
            port: 5000,
        })
    );
}

#[test]
fn test_unmarshal_rejects_malformed() {
    assert!(unmarshal_candidate("1 1 udp").is_err());
    assert!(unmarshal_candidate("f 1 sctp 1 1.2.3.4 80 typ host").is_err());
    assert!(unmarshal_candidate("f x udp 1 1.2.3.4 80 typ host").is_err());
    assert!(unmarshal_candidate("f 1 udp 1 1.2.3.4 80 tip host").is_err());
    assert!(unmarshal_candidate("f 1 udp 1 1.2.3.4 80 typ bogus").is_err());
}

#[test]
fn test_foundation_groups_same_base() {
    let mk = |port: u16| {
        CandidateConfig {
            network_type: NetworkType::Udp4,
            address: "192.168.1.2".to_owned(),
            port,
            component: COMPONENT_RTP,
            ..Default::default()
        }
        .new_candidate_host()
    };
    assert_eq!(mk(5000).foundation(), mk(6000).foundation());
}
