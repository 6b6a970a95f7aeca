//! Unsubscribe tokens.
//!
//! A token is `b64(email) "-" b64(md5(email || id || secret))`, both halves
//! URL-safe base64 with padding. It binds an address to a recipient id so
//! an unsubscribe link cannot be forged for another address.

use crate::store::RecipientId;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use md5::{Digest, Md5};

/// Placeholder replaced by the token in a `List-Unsubscribe` template.
pub const PLACEHOLDER: &str = "%s";

/// Encoded length of the 16-byte hash half.
const HASH_LEN: usize = 24;

/// Derives the token for `email` and `id`.
#[must_use]
pub fn derive(email: &str, id: RecipientId, secret: &str) -> String {
    format!(
        "{}-{}",
        URL_SAFE.encode(email.as_bytes()),
        URL_SAFE.encode(digest(email, id, secret))
    )
}

/// Fills the first placeholder in `template` with the token; templates
/// without one are returned as is.
#[must_use]
pub fn unsubscribe_url(template: &str, email: &str, id: RecipientId, secret: &str) -> String {
    if template.contains(PLACEHOLDER) {
        template.replacen(PLACEHOLDER, &derive(email, id, secret), 1)
    } else {
        template.to_string()
    }
}

/// A token split back into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedToken {
    /// Address the token was issued for.
    pub email: String,
    /// Keyed hash.
    pub hash: Vec<u8>,
}

/// Splits a token. The email half may itself contain `-`, so the split
/// is made at the fixed-length hash half.
#[must_use]
pub fn parse(token: &str) -> Option<ParsedToken> {
    let split = token.len().checked_sub(HASH_LEN + 1)?;
    if !token.is_char_boundary(split) || token.as_bytes()[split] != b'-' {
        return None;
    }
    let (email, hash) = (&token[..split], &token[split + 1..]);
    let email = String::from_utf8(URL_SAFE.decode(email).ok()?).ok()?;
    let hash = URL_SAFE.decode(hash).ok()?;
    Some(ParsedToken { email, hash })
}

/// Returns the address if the token was issued for recipient `id` under
/// `secret`.
#[must_use]
pub fn verify(token: &str, id: RecipientId, secret: &str) -> Option<String> {
    let parsed = parse(token)?;
    (parsed.hash == digest(&parsed.email, id, secret)).then_some(parsed.email)
}

fn digest(email: &str, id: RecipientId, secret: &str) -> Vec<u8> {
    Md5::digest(format!("{email}{id}{secret}").as_bytes()).to_vec()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn known_token() {
        let token = derive("jane@example.com", 42, "s3cret");
        assert!(token.starts_with("amFuZUBleGFtcGxlLmNvbQ==-"));
        assert_eq!(token.len(), "amFuZUBleGFtcGxlLmNvbQ==".len() + 1 + HASH_LEN);
        assert_eq!(token, derive("jane@example.com", 42, "s3cret"));
    }

    #[test]
    fn each_input_changes_the_token() {
        let base = derive("jane@example.com", 42, "s3cret");
        assert_ne!(base, derive("jane@example.org", 42, "s3cret"));
        assert_ne!(base, derive("jane@example.com", 43, "s3cret"));
        assert_ne!(base, derive("jane@example.com", 42, "s3cret!"));
    }

    #[test]
    fn url_substitution() {
        let url = unsubscribe_url("<https://x.test/u/%s?again=%s>", "a@b.c", 1, "k");
        assert_eq!(url, format!("<https://x.test/u/{}?again=%s>", derive("a@b.c", 1, "k")));
        assert_eq!(
            unsubscribe_url("<mailto:leave@x.test>", "a@b.c", 1, "k"),
            "<mailto:leave@x.test>"
        );
    }

    #[test]
    fn verify_accepts_only_matching_id_and_secret() {
        let token = derive("jane@example.com", 42, "s3cret");
        assert_eq!(verify(&token, 42, "s3cret").as_deref(), Some("jane@example.com"));
        assert_eq!(verify(&token, 41, "s3cret"), None);
        assert_eq!(verify(&token, 42, "other"), None);
        assert_eq!(verify("garbage", 42, "s3cret"), None);
    }

    #[test]
    fn parse_splits_at_hash_half() {
        // "?>>" encodes to "Pz4-", so the email half contains a dash
        let email = "?>>@example.com";
        let token = derive(email, 7, "k");
        assert!(token[..token.len() - HASH_LEN - 1].contains('-'));
        assert_eq!(parse(&token).unwrap().email, email);
    }

    proptest! {
        #[test]
        fn verify_after_derive(email in "[a-z0-9.+-]{1,20}@[a-z]{1,10}\\.[a-z]{2,4}", id in 0i64..1_000_000, secret in ".{0,16}") {
            let token = derive(&email, id, &secret);
            prop_assert_eq!(verify(&token, id, &secret), Some(email));
        }
    }
}
