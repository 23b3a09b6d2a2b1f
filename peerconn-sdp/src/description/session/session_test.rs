use super::*;

const CANONICAL: &str = "v=0\r\n\
o=- 4242 2 IN IP4 0.0.0.0\r\n\
s=-\r\n\
t=0 0\r\n\
a=group:BUNDLE 1 0\r\n\
a=ice-options:trickle\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
c=IN IP4 0.0.0.0\r\n\
a=mid:1\r\n\
a=rtpmap:111 opus/48000/2\r\n\
a=recvonly\r\n\
a=rtcp-mux\r\n";

#[test]
fn test_unmarshal_marshal_idempotent() {
    let sd = SessionDescription::unmarshal(CANONICAL).expect("parse");
    assert_eq!(sd.marshal(), CANONICAL);

    // A second round trip must be byte-identical as well.
    let again = SessionDescription::unmarshal(&sd.marshal()).expect("reparse");
    assert_eq!(again, sd);
}

#[test]
fn test_unmarshal_accepts_bare_lf() {
    let lf = CANONICAL.replace("\r\n", "\n");
    let sd = SessionDescription::unmarshal(&lf).expect("parse");
    assert_eq!(sd.media_descriptions.len(), 1);
    assert_eq!(sd.marshal(), CANONICAL);
}

#[test]
fn test_attribute_accessors() {
    let sd = SessionDescription::unmarshal(CANONICAL).unwrap();
    assert_eq!(sd.attribute("group"), Some(Some("BUNDLE 1 0")));
    assert_eq!(sd.attribute("missing"), None);

    let md = &sd.media_descriptions[0];
    assert_eq!(md.attribute("mid"), Some(Some("1")));
    assert_eq!(md.attribute("recvonly"), Some(None));
    assert_eq!(md.media_name.media, "audio");
    assert_eq!(md.media_name.formats, vec!["111"]);
    assert_eq!(
        md.media_name.protos,
        vec!["UDP", "TLS", "RTP", "SAVPF"]
    );
}

#[test]
fn test_unmarshal_rejects_garbage() {
    assert!(SessionDescription::unmarshal("not sdp at all").is_err());
    assert!(SessionDescription::unmarshal("x=1\r\n").is_err());
    // missing version line
    assert!(SessionDescription::unmarshal("s=-\r\nt=0 0\r\n").is_err());
}

#[test]
fn test_multiple_media_sections() {
    let raw = format!(
        "{CANONICAL}m=video 9 UDP/TLS/RTP/SAVPF 96 97\r\na=mid:2\r\nm=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\na=mid:0\r\na=sctp-port:5000\r\n"
    );
    let sd = SessionDescription::unmarshal(&raw).expect("parse");
    assert_eq!(sd.media_descriptions.len(), 3);
    assert_eq!(sd.media_descriptions[1].media_name.formats, vec!["96", "97"]);
    assert_eq!(
        sd.media_descriptions[2].media_name.formats,
        vec!["webrtc-datachannel"]
    );
    assert_eq!(sd.marshal(), raw);
}
