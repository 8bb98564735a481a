//! Identifier and referral-code generation.

use rand::Rng;

const DIGITS: &[u8] = b"0123456789";
const ALNUM: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const LOWER_ALNUM: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Length of the random part of an API key.
const API_KEY_LEN: usize = 32;
/// Length of the random part of a business id.
const BUSINESS_ID_LEN: usize = 12;
/// Maximum letters taken from the referrer's name.
const CODE_NAME_LEN: usize = 8;

fn random_token(alphabet: &[u8], len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| char::from(alphabet[rng.random_range(0..alphabet.len())]))
        .collect()
}

/// Generate a candidate referral code from a referrer's name.
///
/// Takes the letters of the first word of `name` (up to eight), appends
/// two random digits, and prepends the business's code prefix. The result
/// is uppercase. Names whose first word has no letters fall back to the
/// letters of the whole name; names with no letters at all yield a
/// digits-only code.
///
/// Uniqueness is not guaranteed here; callers check the store and retry.
pub fn generate_referral_code(name: &str, prefix: &str) -> String {
    let first_word = name.split_whitespace().next().unwrap_or("");
    let mut base: String = first_word
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .take(CODE_NAME_LEN)
        .collect();
    if base.is_empty() {
        base = name
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .take(CODE_NAME_LEN)
            .collect();
    }
    let suffix = random_token(DIGITS, 2);
    format!("{prefix}{base}{suffix}").to_uppercase()
}

/// Generate a fresh business API key.
pub fn generate_api_key() -> String {
    format!("oreft_{}", random_token(ALNUM, API_KEY_LEN))
}

/// Generate a fresh business identifier.
pub fn generate_business_id() -> String {
    format!("biz_{}", random_token(LOWER_ALNUM, BUSINESS_ID_LEN))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn code_uses_the_first_word_uppercased() {
        let code = generate_referral_code("jane smith", "");
        assert_eq!(code.len(), "JANE".len() + 2);
        assert!(code.starts_with("JANE"));
        assert!(code[4..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn code_strips_non_letters_and_truncates() {
        let code = generate_referral_code("jean-baptiste2000 grenouille", "");
        // "jeanbaptiste" truncated to eight letters.
        assert!(code.starts_with("JEANBAPT"));
        assert_eq!(code.len(), 8 + 2);
    }

    #[test]
    fn code_prepends_and_uppercases_the_prefix() {
        let code = generate_referral_code("jane", "vip-");
        assert!(code.starts_with("VIP-JANE"));
    }

    #[test]
    fn numeric_first_word_falls_back_to_whole_name_letters() {
        let code = generate_referral_code("21 pilots", "");
        assert!(code.starts_with("PILOTS"));
    }

    #[test]
    fn all_numeric_name_yields_a_digits_only_code() {
        let code = generate_referral_code("12345", "");
        assert_eq!(code.len(), 2);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn api_key_and_business_id_shapes() {
        let key = generate_api_key();
        assert!(key.starts_with("oreft_"));
        assert_eq!(key.len(), "oreft_".len() + 32);
        assert!(key["oreft_".len()..].chars().all(|c| c.is_ascii_alphanumeric()));

        let id = generate_business_id();
        assert!(id.starts_with("biz_"));
        assert_eq!(id.len(), "biz_".len() + 12);
        assert!(
            id["biz_".len()..]
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        );
    }

    #[test]
    fn codes_vary_across_calls() {
        let codes: std::collections::HashSet<_> =
            (0..50).map(|_| generate_referral_code("jane", "")).collect();
        // Two random digits give a hundred variants; fifty draws should
        // produce more than one.
        assert!(codes.len() > 1);
    }
}
