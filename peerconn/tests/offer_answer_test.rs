//! Offer/answer negotiation driven end to end through the public API.

use peerconn::peer_connection::configuration::{RTCConfiguration, RTCIceServer};
use peerconn::peer_connection::sdp::{RTCSdpType, RTCSessionDescription};
use peerconn::peer_connection::state::RTCSignalingState;
use peerconn::peer_connection::{RTCOfferOptions, RTCPeerConnection};
use peerconn::rtp_transceiver::direction::RTCRtpTransceiverDirection;
use peerconn::rtp_transceiver::rtp_codec::RtpCodecKind;
use shared::error::Error;

fn new_peer() -> RTCPeerConnection {
    RTCPeerConnection::new(RTCConfiguration {
        local_addrs: vec!["127.0.0.1:52000".parse().unwrap()],
        ..Default::default()
    })
    .expect("peer connection")
}

#[test]
fn test_offer_round_trip() {
    // recvonly audio transceiver with a STUN server configured
    let mut pc = RTCPeerConnection::new(RTCConfiguration {
        ice_servers: vec![RTCIceServer {
            urls: vec!["stun:stun.l.google.com:19302".to_owned()],
            ..Default::default()
        }],
        local_addrs: vec!["127.0.0.1:52001".parse().unwrap()],
        ..Default::default()
    })
    .expect("peer connection");

    pc.add_transceiver(RtpCodecKind::Audio, RTCRtpTransceiverDirection::Recvonly)
        .unwrap();

    let offer = pc.create_offer(RTCOfferOptions::default()).expect("offer");
    let sdp = &offer.sdp;

    assert!(sdp.contains("m=audio 9 UDP/TLS/RTP/SAVPF 111"), "{sdp}");
    assert!(sdp.contains("a=mid:1"), "{sdp}");
    assert!(
        sdp.contains("a=extmap:1 urn:ietf:params:rtp-hdrext:sdes:mid"),
        "{sdp}"
    );
    assert!(sdp.contains("a=recvonly"), "{sdp}");
    assert!(sdp.contains("a=rtcp-mux"), "{sdp}");
    assert!(sdp.contains("a=setup:actpass"), "{sdp}");
    assert!(sdp.contains("a=group:BUNDLE 1 0"), "{sdp}");
    assert!(sdp.contains("a=ice-ufrag:"), "{sdp}");
    assert!(sdp.contains("a=ice-pwd:"), "{sdp}");
    assert!(sdp.contains("a=fingerprint:sha-256 "), "{sdp}");
    assert!(
        sdp.contains("m=application 9 UDP/DTLS/SCTP webrtc-datachannel"),
        "{sdp}"
    );
    assert!(sdp.contains("a=sctp-port:5000"), "{sdp}");

    pc.set_local_description(offer).expect("set local");
    assert_eq!(pc.signaling_state(), RTCSignalingState::HaveLocalOffer);
}

fn remote_video_offer_with_rtx() -> String {
    "v=0\r\n\
o=- 99 2 IN IP4 0.0.0.0\r\n\
s=-\r\n\
t=0 0\r\n\
a=group:BUNDLE 1\r\n\
a=ice-options:trickle\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96 97\r\n\
c=IN IP4 0.0.0.0\r\n\
a=ice-ufrag:remoteRemoteUfrag\r\n\
a=ice-pwd:remoteRemotePwdRemoteRemotePwd\r\n\
a=fingerprint:sha-256 11:22:33:44:55:66:77:88:99:aa:bb:cc:dd:ee:ff:00:11:22:33:44:55:66:77:88:99:aa:bb:cc:dd:ee:ff:00\r\n\
a=setup:actpass\r\n\
a=mid:1\r\n\
a=sendonly\r\n\
a=rtcp-mux\r\n\
a=rtpmap:96 VP9/90000\r\n\
a=fmtp:96 profile-id=0\r\n\
a=rtcp-fb:96 nack\r\n\
a=rtcp-fb:96 nack pli\r\n\
a=rtpmap:97 rtx/90000\r\n\
a=fmtp:97 apt=96\r\n\
a=ssrc-group:FID 1000 2000\r\n\
a=ssrc:1000 cname:remote-cname\r\n\
a=ssrc:2000 cname:remote-cname\r\n"
        .to_owned()
}

#[test]
fn test_answer_mirrors_rtx() {
    // the answer must include the RTX payload type and a fresh FID group
    // with CNAMEs for both local SSRCs
    let mut pc = new_peer();
    let offer = RTCSessionDescription::offer(remote_video_offer_with_rtx()).unwrap();
    pc.set_remote_description(offer).expect("set remote");
    assert_eq!(pc.signaling_state(), RTCSignalingState::HaveRemoteOffer);

    let answer = pc.create_answer().expect("answer");
    let sdp = &answer.sdp;

    assert!(sdp.contains("m=video 9 UDP/TLS/RTP/SAVPF 96 97"), "{sdp}");
    assert!(sdp.contains("a=rtpmap:97 rtx/90000"), "{sdp}");
    assert!(sdp.contains("a=fmtp:97 apt=96"), "{sdp}");
    assert!(sdp.contains("a=recvonly"), "{sdp}");

    // a new local FID group, with cname lines for both members
    let fid = sdp
        .lines()
        .find(|l| l.starts_with("a=ssrc-group:FID "))
        .expect("FID group present");
    let parts: Vec<&str> = fid["a=ssrc-group:FID ".len()..]
        .split_whitespace()
        .collect();
    assert_eq!(parts.len(), 2);
    assert_ne!(parts, vec!["1000", "2000"], "local SSRCs must be fresh");
    for ssrc in parts {
        assert!(
            sdp.contains(&format!("a=ssrc:{ssrc} cname:")),
            "missing cname for {ssrc}: {sdp}"
        );
    }

    pc.set_local_description(answer).expect("set local answer");
    assert_eq!(pc.signaling_state(), RTCSignalingState::Stable);
}

#[test]
fn test_remote_offer_synthesizes_recvonly_transceiver() {
    let mut pc = new_peer();
    assert!(pc.transceivers().is_empty());

    let offer = RTCSessionDescription::offer(remote_video_offer_with_rtx()).unwrap();
    pc.set_remote_description(offer).unwrap();

    assert_eq!(pc.transceivers().len(), 1);
    let t = &pc.transceivers()[0];
    assert_eq!(t.mid.as_deref(), Some("1"));
    assert_eq!(t.kind, RtpCodecKind::Video);
    assert_eq!(t.direction, RTCRtpTransceiverDirection::Recvonly);
    assert!(t.receiver_track.is_some(), "remote sendonly implies OnTrack");
}

#[test]
fn test_invalid_signaling_transitions_rejected() {
    let mut pc = new_peer();
    pc.add_transceiver(RtpCodecKind::Audio, RTCRtpTransceiverDirection::Sendrecv)
        .unwrap();

    // setting an answer with no offer in place must fail
    let bogus_answer = RTCSessionDescription::answer(remote_video_offer_with_rtx()).unwrap();
    let err = pc.set_local_description(bogus_answer).unwrap_err();
    assert!(matches!(
        err,
        Error::ErrSignalingStateProposedTransitionInvalid(_)
    ));

    // rollback from stable must fail
    assert_eq!(
        pc.set_local_description(RTCSessionDescription::rollback())
            .unwrap_err(),
        Error::ErrSignalingStateCannotRollback
    );
}

#[test]
fn test_rollback_returns_to_stable() {
    let mut pc = new_peer();
    pc.add_transceiver(RtpCodecKind::Audio, RTCRtpTransceiverDirection::Sendrecv)
        .unwrap();
    let offer = pc.create_offer(RTCOfferOptions::default()).unwrap();
    pc.set_local_description(offer).unwrap();
    assert_eq!(pc.signaling_state(), RTCSignalingState::HaveLocalOffer);

    pc.set_local_description(RTCSessionDescription::rollback())
        .expect("rollback");
    assert_eq!(pc.signaling_state(), RTCSignalingState::Stable);
}

#[test]
fn test_remote_description_requires_fingerprint_and_credentials() {
    let mut pc = new_peer();

    let no_fingerprint = remote_video_offer_with_rtx()
        .lines()
        .filter(|l| !l.starts_with("a=fingerprint"))
        .collect::<Vec<_>>()
        .join("\r\n")
        + "\r\n";
    let offer = RTCSessionDescription::offer(no_fingerprint).unwrap();
    assert_eq!(
        pc.set_remote_description(offer).unwrap_err(),
        Error::ErrSessionDescriptionNoFingerprint
    );

    let no_ufrag = remote_video_offer_with_rtx()
        .lines()
        .filter(|l| !l.starts_with("a=ice-ufrag"))
        .collect::<Vec<_>>()
        .join("\r\n")
        + "\r\n";
    let offer = RTCSessionDescription::offer(no_ufrag).unwrap();
    assert_eq!(
        pc.set_remote_description(offer).unwrap_err(),
        Error::ErrSessionDescriptionMissingIceUfrag
    );
}

#[test]
fn test_ice_restart_on_credential_change() {
    // changed remote credentials trigger a local restart with fresh
    // credentials, transceivers intact
    let mut pc = new_peer();
    let offer = RTCSessionDescription::offer(remote_video_offer_with_rtx()).unwrap();
    pc.set_remote_description(offer).unwrap();
    let answer = pc.create_answer().unwrap();
    pc.set_local_description(answer).unwrap();

    let creds_before = pc.local_ice_credentials();
    let transceivers_before = pc.transceivers().len();

    let restarted = remote_video_offer_with_rtx()
        .replace("remoteRemoteUfrag", "changedChangedUfrag")
        .replace(
            "remoteRemotePwdRemoteRemotePwd",
            "changedChangedPwdChangedChangedPwd",
        );
    let offer2 = RTCSessionDescription::offer(restarted).unwrap();
    pc.set_remote_description(offer2).expect("restart offer");

    let creds_after = pc.local_ice_credentials();
    assert_ne!(creds_before, creds_after, "local credentials regenerate");
    assert_eq!(
        pc.transceivers().len(),
        transceivers_before,
        "transceivers survive the restart"
    );

    let answer2 = pc.create_answer().unwrap();
    assert!(answer2.sdp.contains(&format!("a=ice-ufrag:{}", creds_after.0)));
    pc.set_local_description(answer2).unwrap();
    assert_eq!(pc.signaling_state(), RTCSignalingState::Stable);
}

#[test]
fn test_operations_after_close_fail() {
    let mut pc = new_peer();
    pc.do_close().unwrap();

    assert_eq!(
        pc.create_offer(RTCOfferOptions::default()).unwrap_err(),
        Error::ErrConnectionClosed
    );
    assert_eq!(
        pc.add_transceiver(RtpCodecKind::Audio, RTCRtpTransceiverDirection::Sendrecv)
            .unwrap_err(),
        Error::ErrConnectionClosed
    );
    assert_eq!(
        pc.set_remote_description(
            RTCSessionDescription::offer(remote_video_offer_with_rtx()).unwrap()
        )
        .unwrap_err(),
        Error::ErrConnectionClosed
    );
}

#[test]
fn test_offer_reparse_is_valid_sdp() {
    let mut pc = new_peer();
    pc.add_transceiver(RtpCodecKind::Video, RTCRtpTransceiverDirection::Sendrecv)
        .unwrap();
    let offer = pc.create_offer(RTCOfferOptions::default()).unwrap();

    // the emitted SDP must survive our own parser structurally intact
    let reparsed = sdp::SessionDescription::unmarshal(&offer.sdp).expect("valid SDP");
    assert_eq!(reparsed.marshal(), offer.sdp);
    assert_eq!(reparsed.media_descriptions.len(), 2); // video + application
    assert_eq!(offer.sdp_type, RTCSdpType::Offer);
}
