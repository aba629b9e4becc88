//! Name resolution (C1).
//!
//! Parses a caller-supplied name into a fully-qualified [`Identity`]: a
//! `(user_scope, session_scope, leaf)` tuple. Two identities are the same
//! mutex if and only if all three fields are equal.

use ref_cast::RefCast;

use crate::config::Config;
use crate::error::{MutexError, Result};

const GLOBAL_PREFIX: &str = "Global\\";
const LOCAL_PREFIX: &str = "Local\\";

/// A validated leaf name: non-empty, contains no path separator.
///
/// `#[repr(transparent)]` over `str` so an already-validated `&str` can be
/// reinterpreted as `&Leaf` for free via [`ref_cast`] instead of allocating.
#[derive(RefCast, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Leaf(str);

impl Leaf {
    fn validate(s: &str) -> Result<&Leaf> {
        if s.is_empty() {
            return Err(MutexError::InvalidName);
        }
        let bytes = s.as_bytes();
        if memchr::memchr2(b'/', b'\\', bytes).is_some() {
            return Err(MutexError::InvalidName);
        }
        Ok(Leaf::ref_cast(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The fully-qualified identity of a mutex: `(user_scope, session_scope, leaf)`.
///
/// `Unnamed` identities never touch C2/C6 — the mutex exists only as an
/// in-process [`crate::robust_lock::LockBody`] with no backing file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    Unnamed,
    Named {
        user_scope: bool,
        session_scope: bool,
        leaf: String,
    },
}

impl Identity {
    /// Parse `name` (empty ⇒ unnamed) under the given user-scope flag.
    ///
    /// `Global\`/`Local\` prefixes are recognized case-sensitively (§4.1);
    /// anything else defaults to session-scope `true`. `current_user_only`
    /// is passed through unchanged and partitions the namespace: two
    /// mutexes with equal leaves but different user-scope are distinct.
    pub fn parse(name: &str, current_user_only: bool, config: &Config) -> Result<Identity> {
        if name.is_empty() {
            return Ok(Identity::Unnamed);
        }

        let (session_scope, rest) = if let Some(rest) = name.strip_prefix(GLOBAL_PREFIX) {
            (false, rest)
        } else if let Some(rest) = name.strip_prefix(LOCAL_PREFIX) {
            (true, rest)
        } else {
            (true, name)
        };

        let leaf = Leaf::validate(rest)?;

        // Leaves up to MAX_LEAF_LEN are guaranteed to succeed (P9); beyond
        // that we refuse unconditionally rather than gamble on a particular
        // host's path limit.
        if leaf.as_str().len() > crate::config::MAX_LEAF_LEN {
            return Err(MutexError::FilenameExceedsRange);
        }

        let encoded_len = estimate_path_len(current_user_only, session_scope, leaf.as_str());
        if encoded_len > config.path_max() {
            return Err(MutexError::FilenameExceedsRange);
        }

        Ok(Identity::Named {
            user_scope: current_user_only,
            session_scope,
            leaf: leaf.as_str().to_owned(),
        })
    }
}

/// Rough upper bound on the encoded on-disk path length, used only to decide
/// whether a name must be rejected with `FilenameExceedsRange`. Deliberately
/// conservative (uid/session id are at most 20 ASCII digits).
fn estimate_path_len(user_scope: bool, session_scope: bool, leaf: &str) -> usize {
    let user_dir_len = if user_scope {
        ".dotnet-uid".len() + 20
    } else {
        ".dotnet".len()
    };
    let session_dir_len = if session_scope {
        "session".len() + 20
    } else {
        "global".len()
    };
    // root + '/' + user_dir + "/shm/" + session_dir + '/' + leaf
    user_dir_len + "/shm/".len() + session_dir_len + 2 + leaf.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Config {
        Config::default()
    }

    #[test]
    fn empty_name_is_unnamed() {
        assert_eq!(Identity::parse("", true, &cfg()).unwrap(), Identity::Unnamed);
    }

    #[test]
    fn default_scope_is_session() {
        let id = Identity::parse("foo", true, &cfg()).unwrap();
        assert_eq!(
            id,
            Identity::Named {
                user_scope: true,
                session_scope: true,
                leaf: "foo".to_owned(),
            }
        );
    }

    #[test]
    fn global_prefix_sets_all_sessions() {
        let id = Identity::parse("Global\\foo", false, &cfg()).unwrap();
        assert_eq!(
            id,
            Identity::Named {
                user_scope: false,
                session_scope: false,
                leaf: "foo".to_owned(),
            }
        );
    }

    #[test]
    fn local_prefix_sets_current_session() {
        let id = Identity::parse("Local\\foo", true, &cfg()).unwrap();
        assert_eq!(
            id,
            Identity::Named {
                user_scope: true,
                session_scope: true,
                leaf: "foo".to_owned(),
            }
        );
    }

    #[test]
    fn separators_are_rejected() {
        assert!(matches!(
            Identity::parse("foo/bar", true, &cfg()),
            Err(MutexError::InvalidName)
        ));
        assert!(matches!(
            Identity::parse("foo\\bar", true, &cfg()),
            Err(MutexError::InvalidName)
        ));
    }

    #[test]
    fn distinct_user_scope_is_distinct_identity() {
        let a = Identity::parse("foo", true, &cfg()).unwrap();
        let b = Identity::parse("foo", false, &cfg()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn leaf_of_256_succeeds_257_fails() {
        let ok = "a".repeat(256);
        let too_long = "a".repeat(257);
        assert!(Identity::parse(&ok, true, &cfg()).is_ok());
        assert!(matches!(
            Identity::parse(&too_long, true, &cfg()),
            Err(MutexError::FilenameExceedsRange)
        ));
    }
}
