use shared::error::Result;

/// RTCCertificate is the DTLS identity of a peer connection: a self-signed
/// X.509 certificate whose SHA-256 fingerprint is announced in SDP and
/// verified during the DTLS handshake (RFC 8827).
#[derive(Clone)]
pub struct RTCCertificate {
    pub(crate) dtls_certificate: dtls::crypto::Certificate,
}

impl RTCCertificate {
    /// Generates a fresh ECDSA P-256 identity. Certificate generation is the
    /// construction-time gate of a peer connection: every operation that
    /// needs the fingerprint happens after this returns.
    pub fn generate() -> Result<Self> {
        Ok(RTCCertificate {
            dtls_certificate: dtls::crypto::Certificate::generate_self_signed("peerconn")?,
        })
    }

    /// The lowercase colon-separated SHA-256 fingerprint for
    /// `a=fingerprint:sha-256`.
    pub fn fingerprint(&self) -> String {
        self.dtls_certificate.fingerprint()
    }
}

#[cfg(test)]
mod certificate_test {
    use super::*;

    #[test]
    fn test_generate_and_fingerprint_shape() {
        let cert = RTCCertificate::generate().expect("generate");
        let fp = cert.fingerprint();
        assert_eq!(fp.split(':').count(), 32);
        assert_ne!(fp, RTCCertificate::generate().unwrap().fingerprint());
    }
}
