//! Recipient target normalization
//!
//! Translates the heterogeneous target strings hosts pass around
//! (`user:` / `group:` prefixes, raw wxids, chatroom ids) into a canonical
//! recipient descriptor for the outbound senders.

use serde::Serialize;

/// Suffix chatroom identifiers carry
const CHATROOM_SUFFIX: &str = "@chatroom";

/// Hint shown to hosts when prompting for a target
pub const TARGET_HINT: &str =
    "user:<wxid> or group:<id@chatroom>; bare wxids and chatroom ids also work";

/// Canonical message recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RecipientTarget {
    User { id: String },
    Group { id: String },
}

impl RecipientTarget {
    /// The wire identifier sent to the proxy
    pub fn id(&self) -> &str {
        match self {
            RecipientTarget::User { id } | RecipientTarget::Group { id } => id,
        }
    }
}

/// Normalize a user-supplied target string.
///
/// Rules, in order: `user:` prefix wins, then `group:` prefix, then the
/// `@chatroom` suffix; anything else is a direct user id.
pub fn normalize_target(input: &str) -> RecipientTarget {
    if let Some(id) = input.strip_prefix("user:") {
        return RecipientTarget::User { id: id.to_string() };
    }
    if let Some(id) = input.strip_prefix("group:") {
        return RecipientTarget::Group { id: id.to_string() };
    }
    if input.ends_with(CHATROOM_SUFFIX) {
        return RecipientTarget::Group {
            id: input.to_string(),
        };
    }
    RecipientTarget::User {
        id: input.to_string(),
    }
}

/// Whether a free-text token looks like an addressable identifier rather
/// than a display name needing resolution.
///
/// This is a heuristic, not a validator: a `wxid_` prefix or a chatroom
/// suffix is taken as an id shape. False positives and negatives are
/// acceptable to callers.
pub fn looks_like_id(candidate: &str) -> bool {
    candidate.starts_with("wxid_") || candidate.ends_with(CHATROOM_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_prefix() {
        assert_eq!(
            normalize_target("user:wxid_abc123"),
            RecipientTarget::User {
                id: "wxid_abc123".to_string()
            }
        );
    }

    #[test]
    fn test_group_prefix() {
        assert_eq!(
            normalize_target("group:12345@chatroom"),
            RecipientTarget::Group {
                id: "12345@chatroom".to_string()
            }
        );
    }

    #[test]
    fn test_bare_id_defaults_to_user() {
        assert_eq!(
            normalize_target("wxid_direct"),
            RecipientTarget::User {
                id: "wxid_direct".to_string()
            }
        );
    }

    #[test]
    fn test_chatroom_suffix_is_group() {
        assert_eq!(
            normalize_target("wxid_xxx@chatroom"),
            RecipientTarget::Group {
                id: "wxid_xxx@chatroom".to_string()
            }
        );
    }

    #[test]
    fn test_looks_like_id() {
        assert!(looks_like_id("wxid_abc123"));
        assert!(looks_like_id("12345@chatroom"));
        assert!(!looks_like_id("invalid_id"));
        assert!(!looks_like_id("张三"));
    }

    #[test]
    fn test_target_id_accessor() {
        assert_eq!(normalize_target("group:1@chatroom").id(), "1@chatroom");
        assert_eq!(normalize_target("user:wxid_a").id(), "wxid_a");
    }
}
