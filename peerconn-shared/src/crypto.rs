use crate::error::Result;

/// Export keying material as defined in RFC 5705.
///
/// Lets protocols use DTLS for key establishment and derive their own secrets
/// from the handshake, which is how SRTP obtains its master keys (RFC 5764).
pub trait KeyingMaterialExporter {
    fn export_keying_material(&self, label: &str, context: &[u8], length: usize)
        -> Result<Vec<u8>>;
}
