use shared::util::math_rand_alpha_number;

const UFRAG_LEN: usize = 16;
const PWD_LEN: usize = 32;
const CANDIDATE_ID_LEN: usize = 24;

/// Generates an ICE username fragment: 16 characters, well above the 24-bit
/// minimum of RFC 8445 section 5.3.
pub fn generate_ufrag() -> String {
    math_rand_alpha_number(UFRAG_LEN)
}

/// Generates an ICE password: 32 characters, above the 128-bit minimum.
pub fn generate_pwd() -> String {
    math_rand_alpha_number(PWD_LEN)
}

pub fn generate_cand_id() -> String {
    format!("candidate:{}", math_rand_alpha_number(CANDIDATE_ID_LEN))
}

#[cfg(test)]
mod rand_test {
    use super::*;

    #[test]
    fn test_lengths_satisfy_rfc_minimums() {
        assert!(generate_ufrag().len() * 8 >= 24);
        assert!(generate_pwd().len() * 8 >= 128);
    }

    #[test]
    fn test_randomness() {
        assert_ne!(generate_ufrag(), generate_ufrag());
        assert_ne!(generate_pwd(), generate_pwd());
    }
}
