use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;
use shared::error::{Error, Result};

pub(crate) const LABEL_SRTP_ENCRYPTION: u8 = 0x00;
pub(crate) const LABEL_SRTP_AUTHENTICATION_TAG: u8 = 0x01;
pub(crate) const LABEL_SRTP_SALT: u8 = 0x02;
pub(crate) const LABEL_SRTCP_ENCRYPTION: u8 = 0x03;
pub(crate) const LABEL_SRTCP_AUTHENTICATION_TAG: u8 = 0x04;
pub(crate) const LABEL_SRTCP_SALT: u8 = 0x05;

pub(crate) const SRTCP_INDEX_SIZE: usize = 4;

/// Derives a session key/salt/auth key from the master key and salt with the
/// AES-CM PRF of RFC 3711 section 4.3.3.
pub(crate) fn aes_cm_key_derivation(
    label: u8,
    master_key: &[u8],
    master_salt: &[u8],
    index_over_kdr: usize,
    out_len: usize,
) -> Result<Vec<u8>> {
    if index_over_kdr != 0 {
        // 6.1.2 of RFC 3711: if the KDR is 0, the key derivation happens once
        return Err(Error::Other(
            "index_over_kdr > 0 is not supported yet".to_owned(),
        ));
    }
    if master_key.len() != 16 {
        return Err(Error::ErrShortSrtpMasterKey);
    }
    if master_salt.len() > 14 {
        return Err(Error::ErrShortSrtpMasterSalt);
    }

    // The input is the master salt XORed with the label, shifted into
    // position, with a 16-bit block counter appended.
    let n_master_key = master_key.len();
    let mut prf_in = vec![0u8; n_master_key];
    prf_in[..master_salt.len()].copy_from_slice(master_salt);
    prf_in[7] ^= label;

    let cipher = Aes128::new(GenericArray::from_slice(master_key));

    let mut out = vec![0u8; ((out_len + n_master_key) / n_master_key) * n_master_key];
    let mut i = 0u16;
    let mut n = 0usize;
    while n < out_len {
        prf_in[n_master_key - 2] = (i >> 8) as u8;
        prf_in[n_master_key - 1] = i as u8;

        let mut block = GenericArray::clone_from_slice(&prf_in);
        cipher.encrypt_block(&mut block);
        out[n..n + n_master_key].copy_from_slice(&block);

        i += 1;
        n += n_master_key;
    }

    out.truncate(out_len);
    Ok(out)
}

/// Computes the per-packet AES-CM counter block of RFC 3711 section 4.1.1.
pub(crate) fn generate_counter(
    sequence_number: u16,
    rollover_counter: u32,
    ssrc: u32,
    session_salt: &[u8],
) -> Result<[u8; 16]> {
    if session_salt.len() > 16 {
        return Err(Error::ErrShortSrtpMasterSalt);
    }

    let mut counter = [0u8; 16];
    counter[4..8].copy_from_slice(&ssrc.to_be_bytes());
    counter[8..12].copy_from_slice(&rollover_counter.to_be_bytes());
    counter[12..16].copy_from_slice(&((sequence_number as u32) << 16).to_be_bytes());

    for (i, s) in session_salt.iter().enumerate() {
        counter[i] ^= s;
    }

    Ok(counter)
}

#[cfg(test)]
mod key_derivation_test {
    use super::*;

    // Test vectors from RFC 3711 Appendix B.3.
    #[test]
    fn test_rfc3711_key_derivation_vectors() {
        let master_key: Vec<u8> = vec![
            0xE1, 0xF9, 0x7A, 0x0D, 0x3E, 0x01, 0x8B, 0xE0, 0xD6, 0x4F, 0xA3, 0x2C, 0x06, 0xDE,
            0x41, 0x39,
        ];
        let master_salt: Vec<u8> = vec![
            0x0E, 0xC6, 0x75, 0xAD, 0x49, 0x8A, 0xFE, 0xEB, 0xB6, 0x96, 0x0B, 0x3A, 0xAB, 0xE6,
        ];

        let session_key =
            aes_cm_key_derivation(LABEL_SRTP_ENCRYPTION, &master_key, &master_salt, 0, 16)
                .expect("cipher key");
        assert_eq!(
            session_key,
            vec![
                0xC6, 0x1E, 0x7A, 0x93, 0x74, 0x4F, 0x39, 0xEE, 0x10, 0x73, 0x4A, 0xFE, 0x3F, 0xF7,
                0xA0, 0x87,
            ]
        );

        let session_salt =
            aes_cm_key_derivation(LABEL_SRTP_SALT, &master_key, &master_salt, 0, 14)
                .expect("salt");
        assert_eq!(
            session_salt,
            vec![
                0x30, 0xCB, 0xBC, 0x08, 0x86, 0x3D, 0x8C, 0x85, 0xD4, 0x9D, 0xB3, 0x4A, 0x9A, 0xE1,
            ]
        );

        let auth_key =
            aes_cm_key_derivation(LABEL_SRTP_AUTHENTICATION_TAG, &master_key, &master_salt, 0, 20)
                .expect("auth key");
        assert_eq!(
            auth_key,
            vec![
                0xCE, 0xBE, 0x32, 0x1F, 0x6F, 0xF7, 0x71, 0x6B, 0x6F, 0xD4, 0xAB, 0x49, 0xAF, 0x25,
                0x6A, 0x15, 0x6D, 0x38, 0xBA, 0xA4,
            ]
        );
    }

    #[test]
    fn test_short_master_key_rejected() {
        assert_eq!(
            aes_cm_key_derivation(LABEL_SRTP_ENCRYPTION, &[0u8; 8], &[0u8; 14], 0, 16),
            Err(Error::ErrShortSrtpMasterKey)
        );
    }

    #[test]
    fn test_counter_layout() {
        let salt = vec![0u8; 14];
        let counter = generate_counter(0x1234, 0x56789abc, 0xdeadbeef, &salt).expect("counter");
        assert_eq!(&counter[4..8], &0xdeadbeefu32.to_be_bytes());
        assert_eq!(&counter[8..12], &0x56789abcu32.to_be_bytes());
        assert_eq!(&counter[12..14], &[0x12, 0x34]);
        assert_eq!(&counter[14..16], &[0, 0]);
    }
}
