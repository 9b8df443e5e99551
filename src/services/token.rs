//! Share and calendar feed capability tokens.
//!
//! Both token kinds are URL-safe base64 (no padding) of CSPRNG bytes. They differ in
//! length so one kind can never pass the other's format check.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use std::fmt;

const SHARE_TOKEN_BYTES: usize = 16;
const SHARE_TOKEN_LEN: usize = 22;
const FEED_TOKEN_BYTES: usize = 24;
const FEED_TOKEN_LEN: usize = 32;

/// Token granting read access to a scoped share view
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ShareToken(String);

/// Token identifying a per-pet calendar subscription
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct FeedToken(String);

impl ShareToken {
    /// Draw a fresh share token from the OS random source
    pub fn generate() -> Self {
        Self(random_token(SHARE_TOKEN_BYTES))
    }

    /// Accept untrusted input only if it has the share token format
    pub fn parse(s: &str) -> Option<Self> {
        is_valid_share_format(s).then(|| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FeedToken {
    /// Draw a fresh feed token from the OS random source
    pub fn generate() -> Self {
        Self(random_token(FEED_TOKEN_BYTES))
    }

    pub fn parse(s: &str) -> Option<Self> {
        is_valid_feed_format(s).then(|| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShareToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for FeedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn random_token(n_bytes: usize) -> String {
    let mut bytes = vec![0u8; n_bytes];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn has_token_format(s: &str, len: usize) -> bool {
    // Byte length check first so oversized input is rejected without scanning it.
    s.len() == len
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// `^[A-Za-z0-9_-]{22}$`
pub fn is_valid_share_format(s: &str) -> bool {
    has_token_format(s, SHARE_TOKEN_LEN)
}

/// `^[A-Za-z0-9_-]{32}$`
pub fn is_valid_feed_format(s: &str) -> bool {
    has_token_format(s, FEED_TOKEN_LEN)
}

pub fn build_share_url(token: &ShareToken, origin: &str) -> String {
    format!("{}/share/{}", origin.trim_end_matches('/'), token)
}

pub fn build_feed_url(token: &FeedToken, origin: &str) -> String {
    format!("{}/calendar/{}.ics", origin.trim_end_matches('/'), token)
}

/// Feed URL using the `webcal://` scheme so calendar apps offer to subscribe
pub fn build_feed_subscribe_url(token: &FeedToken, origin: &str) -> String {
    let url = build_feed_url(token, origin);
    if let Some(rest) = url.strip_prefix("https://") {
        format!("webcal://{}", rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("webcal://{}", rest)
    } else {
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_tokens_are_valid_and_unique() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let token = ShareToken::generate();
            assert!(is_valid_share_format(token.as_str()), "bad token {}", token);
            assert!(seen.insert(token));
        }
    }

    #[test]
    fn test_generated_feed_tokens_are_valid() {
        let token = FeedToken::generate();
        assert!(is_valid_feed_format(token.as_str()));
        assert!(!is_valid_share_format(token.as_str()));
    }

    #[test]
    fn test_validators_reject_malformed_input() {
        let valid_share = "A1b2C3d4E5f6G7h8I9j0Kl";
        let valid_feed = "A1b2C3d4E5f6G7h8I9j0Kl_-abcdefgh";
        assert!(is_valid_share_format(valid_share));
        assert!(is_valid_feed_format(valid_feed));

        let bad_inputs = [
            String::new(),
            "a".repeat(21),
            "a".repeat(23),
            "a".repeat(31),
            "a".repeat(33),
            "a".repeat(10_000),
        ];
        for input in &bad_inputs {
            assert!(!is_valid_share_format(input), "accepted {:?}", input);
            assert!(!is_valid_feed_format(input), "accepted {:?}", input);
        }

        for bad in ['+', '/', '=', ' ', '\t', '\n', '\0', '\u{7f}', 'é'] {
            let share = format!("{}{}", &valid_share[..21], bad);
            let feed = format!("{}{}", &valid_feed[..31], bad);
            assert!(!is_valid_share_format(&share), "accepted {:?}", share);
            assert!(!is_valid_feed_format(&feed), "accepted {:?}", feed);
        }
    }

    #[test]
    fn test_token_kinds_are_not_interchangeable() {
        let share = ShareToken::generate();
        let feed = FeedToken::generate();
        assert!(FeedToken::parse(share.as_str()).is_none());
        assert!(ShareToken::parse(feed.as_str()).is_none());
    }

    #[test]
    fn test_build_urls() {
        let token = ShareToken::parse("A1b2C3d4E5f6G7h8I9j0Kl").unwrap();
        assert_eq!(
            build_share_url(&token, "https://pets.example.com/"),
            "https://pets.example.com/share/A1b2C3d4E5f6G7h8I9j0Kl"
        );

        let feed = FeedToken::parse("A1b2C3d4E5f6G7h8I9j0Kl_-abcdefgh").unwrap();
        assert_eq!(
            build_feed_url(&feed, "https://pets.example.com"),
            "https://pets.example.com/calendar/A1b2C3d4E5f6G7h8I9j0Kl_-abcdefgh.ics"
        );
        assert_eq!(
            build_feed_subscribe_url(&feed, "https://pets.example.com"),
            "webcal://pets.example.com/calendar/A1b2C3d4E5f6G7h8I9j0Kl_-abcdefgh.ics"
        );
    }
}
