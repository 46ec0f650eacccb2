//! Chat-reference resolution.
//!
//! User-supplied chat references come in two shapes:
//! - an already-canonical key: 32 lowercase hex characters, returned
//!   verbatim;
//! - a `platform:id:type` triple (type `group` or `private`), normalized
//!   with the same derivation rule the host uses to mint chat keys.
//!
//! A missing or malformed reference falls back to the chat the command was
//! issued from; with no fallback the operation fails with a user-facing
//! "no target chat" error.

use parlance_core::error::Error;
use parlance_core::ChatId;
use sha2::{Digest, Sha256};
use std::fmt::Write;

/// Length of a canonical chat key.
const CANONICAL_LEN: usize = 32;

/// Resolve an optional chat reference against the invoking chat.
pub fn resolve_chat_ref(
    token: Option<&str>,
    current_chat: Option<&ChatId>,
) -> Result<ChatId, Error> {
    if let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) {
        if let Some(chat_id) = canonicalize(token) {
            return Ok(chat_id);
        }
    }
    current_chat.cloned().ok_or_else(|| {
        Error::Resolution("run the command inside a chat or pass `in <chat>`".into())
    })
}

/// Normalize a single reference token to a canonical chat key.
/// `None` when the token is neither canonical nor a well-formed triple.
pub fn canonicalize(token: &str) -> Option<ChatId> {
    let candidate = token.trim();
    if is_canonical(candidate) {
        return Some(ChatId::new(candidate));
    }

    let mut parts = candidate.split(':');
    let platform = parts.next()?;
    let id = parts.next()?;
    let kind = parts.next()?;
    if parts.next().is_some() || platform.is_empty() || id.is_empty() {
        return None;
    }
    match kind {
        "group" | "private" => Some(ChatId::new(derive_key(platform, id))),
        _ => None,
    }
}

/// Whether a token already is a canonical key: exactly 32 lowercase hex
/// characters.
fn is_canonical(token: &str) -> bool {
    token.len() == CANONICAL_LEN
        && token
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// The host's key derivation: first 32 hex chars of `sha256("{platform}_{id}")`.
fn derive_key(platform: &str, id: &str) -> String {
    let digest = Sha256::digest(format!("{platform}_{id}").as_bytes());
    digest.iter().take(CANONICAL_LEN / 2).fold(
        String::with_capacity(CANONICAL_LEN),
        |mut out, byte| {
            let _ = write!(out, "{byte:02x}");
            out
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANONICAL: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn canonical_token_passes_through() {
        assert_eq!(canonicalize(CANONICAL).unwrap().as_str(), CANONICAL);
        assert_eq!(canonicalize(&format!("  {CANONICAL} ")).unwrap().as_str(), CANONICAL);
    }

    #[test]
    fn uppercase_or_wrong_length_is_not_canonical() {
        assert!(canonicalize(&CANONICAL.to_uppercase()).is_none());
        assert!(canonicalize(&CANONICAL[..31]).is_none());
        assert!(canonicalize(&format!("{CANONICAL}0")).is_none());
    }

    #[test]
    fn triple_derives_stable_key() {
        let a = canonicalize("qq:941657197:group").unwrap();
        let b = canonicalize("qq:941657197:group").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), CANONICAL_LEN);
        assert!(is_canonical(a.as_str()));

        // Group/private of the same pair derive the same key; a different
        // id derives a different one.
        assert_eq!(a, canonicalize("qq:941657197:private").unwrap());
        assert_ne!(a, canonicalize("qq:941657198:group").unwrap());
    }

    #[test]
    fn malformed_triples_fail() {
        assert!(canonicalize("qq:123").is_none());
        assert!(canonicalize("qq:123:group:extra").is_none());
        assert!(canonicalize(":123:group").is_none());
        assert!(canonicalize("qq::group").is_none());
        assert!(canonicalize("qq:123:channel").is_none());
        assert!(canonicalize("whatever").is_none());
    }

    #[test]
    fn resolve_falls_back_to_current_chat() {
        let current = ChatId::new(CANONICAL);

        // No token at all.
        let resolved = resolve_chat_ref(None, Some(&current)).unwrap();
        assert_eq!(resolved, current);

        // Malformed token also falls back.
        let resolved = resolve_chat_ref(Some("garbage"), Some(&current)).unwrap();
        assert_eq!(resolved, current);

        // Explicit token wins over the current chat.
        let resolved = resolve_chat_ref(Some("qq:1:group"), Some(&current)).unwrap();
        assert_ne!(resolved, current);
    }

    #[test]
    fn resolve_without_fallback_errors() {
        let err = resolve_chat_ref(None, None).unwrap_err();
        assert!(matches!(err, Error::Resolution(_)));
        assert!(err.to_string().contains("no target chat"));
    }
}
