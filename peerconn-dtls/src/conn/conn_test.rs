use super::*;
use crate::crypto::Certificate;
use shared::crypto::KeyingMaterialExporter;

fn config_pair() -> (Arc<HandshakeConfig>, Arc<HandshakeConfig>) {
    let client_cert = Certificate::generate_self_signed("client").unwrap();
    let server_cert = Certificate::generate_self_signed("server").unwrap();

    let mut client_config = HandshakeConfig::new(client_cert.clone());
    client_config.remote_fingerprint = Some(server_cert.fingerprint());
    let mut server_config = HandshakeConfig::new(server_cert);
    server_config.remote_fingerprint = Some(client_cert.fingerprint());

    (Arc::new(client_config), Arc::new(server_config))
}

fn addr(port: u16) -> SocketAddr {
    format!("127.0.0.1:{port}").parse().unwrap()
}

/// Delivers every queued datagram of `from` into `to`.
fn pump(from: &mut DTLSConn, to: &mut DTLSConn) -> Result<usize> {
    let mut n = 0;
    while let Some(datagram) = from.outgoing_raw_packet() {
        to.read(&datagram)?;
        n += 1;
    }
    Ok(n)
}

fn handshake_pair() -> (DTLSConn, DTLSConn) {
    let (client_config, server_config) = config_pair();
    // the cookie binds to the client's address as the server sees it
    let client_addr = addr(41000);
    let mut client = DTLSConn::new(client_config, true, addr(42000));
    let mut server = DTLSConn::new(server_config, false, client_addr);

    client.handshake().expect("client kick-off");

    for _ in 0..10 {
        pump(&mut client, &mut server).expect("client->server");
        pump(&mut server, &mut client).expect("server->client");
        if client.is_handshake_completed() && server.is_handshake_completed() {
            break;
        }
    }

    assert!(client.is_handshake_completed(), "client must complete");
    assert!(server.is_handshake_completed(), "server must complete");
    (client, server)
}

#[test]
fn test_full_handshake() {
    let (client, server) = handshake_pair();

    assert_eq!(
        client.connection_state().srtp_protection_profile(),
        server.connection_state().srtp_protection_profile()
    );
    assert_ne!(
        client.connection_state().srtp_protection_profile(),
        SrtpProtectionProfile::Unsupported
    );
    assert!(client.connection_state().extended_master_secret);
    assert!(server.connection_state().extended_master_secret);
    assert_eq!(client.state.master_secret, server.state.master_secret);
}

#[test]
fn test_exported_srtp_keying_material_matches() {
    let (client, server) = handshake_pair();

    let (client_profile, client_keys) =
        client.connection_state().export_srtp_keying_material().unwrap();
    let (server_profile, server_keys) =
        server.connection_state().export_srtp_keying_material().unwrap();

    assert_eq!(client_profile, server_profile);
    assert_eq!(client_keys.client_key, server_keys.client_key);
    assert_eq!(client_keys.server_key, server_keys.server_key);
    assert_eq!(client_keys.client_salt, server_keys.client_salt);
    assert_eq!(client_keys.server_salt, server_keys.server_salt);
    assert_eq!(client_keys.client_key.len(), 16);
    assert_eq!(client_keys.client_salt.len(), 14);
}

#[test]
fn test_application_data_both_directions() {
    let (mut client, mut server) = handshake_pair();

    client.write(b"from client").unwrap();
    pump(&mut client, &mut server).unwrap();
    assert_eq!(
        server.incoming_application_data().unwrap().as_ref(),
        b"from client"
    );

    server.write(b"from server").unwrap();
    pump(&mut server, &mut client).unwrap();
    assert_eq!(
        client.incoming_application_data().unwrap().as_ref(),
        b"from server"
    );
}

#[test]
fn test_write_before_handshake_fails() {
    let (client_config, _) = config_pair();
    let mut client = DTLSConn::new(client_config, true, addr(42001));
    assert_eq!(client.write(b"x"), Err(Error::ErrHandshakeInProgress));
}

#[test]
fn test_fingerprint_mismatch_aborts() {
    let (_, server_config) = config_pair();
    let client_cert = Certificate::generate_self_signed("client").unwrap();
    let mut bad_client_config = HandshakeConfig::new(client_cert);
    // expect a fingerprint no server will have
    bad_client_config.remote_fingerprint = Some("00:".repeat(31) + "00");

    let mut client = DTLSConn::new(Arc::new(bad_client_config), true, addr(42002));
    let mut server = DTLSConn::new(server_config, false, addr(41002));

    client.handshake().unwrap();
    let mut failed = false;
    for _ in 0..10 {
        if pump(&mut client, &mut server).is_err() || pump(&mut server, &mut client).is_err() {
            failed = true;
            break;
        }
        if client.is_handshake_completed() {
            break;
        }
    }
    assert!(failed, "handshake must abort on fingerprint mismatch");
    assert!(!client.is_handshake_completed());
}

#[test]
fn test_retransmit_on_timeout() {
    let (client_config, _) = config_pair();
    let mut client = DTLSConn::new(client_config, true, addr(42003));
    client.handshake().unwrap();

    // Drop the first ClientHello on the floor
    let first = client.outgoing_raw_packet().expect("initial flight");
    assert!(client.outgoing_raw_packet().is_none());
    let deadline = client.current_retransmit_timer.expect("timer armed");

    client.handshake_timeout(deadline).unwrap();
    let second = client.outgoing_raw_packet().expect("retransmission");

    // Same ClientHello, fresh record sequence number
    assert_eq!(first.len(), second.len());
    assert_ne!(first.as_ref(), second.as_ref());
    assert_eq!(&first[RECORD_LAYER_HEADER_SIZE..], &second[RECORD_LAYER_HEADER_SIZE..]);
}

#[test]
fn test_retransmission_exhaustion_fails() {
    let (client_config, _) = config_pair();
    let max = client_config.maximum_retransmit_number;
    let mut client = DTLSConn::new(client_config, true, addr(42004));
    client.handshake().unwrap();

    let mut result = Ok(());
    for _ in 0..=max + 1 {
        while client.outgoing_raw_packet().is_some() {}
        result = client.handshake_timeout(Instant::now());
        if result.is_err() {
            break;
        }
    }
    assert_eq!(result, Err(Error::ErrHandshakeTimeout));
}

#[test]
fn test_keying_material_export_requires_completion() {
    let (client_config, _) = config_pair();
    let client = DTLSConn::new(client_config, true, addr(42005));
    assert_eq!(
        client
            .connection_state()
            .export_keying_material("EXTRACTOR-dtls_srtp", &[], 60)
            .unwrap_err(),
        Error::HandshakeInProgress
    );
}
