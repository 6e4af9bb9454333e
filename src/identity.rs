//! Identity/session collaborator

use std::sync::RwLock;

/// Who is signed in, if anyone
pub trait IdentityProvider: Send + Sync {
    /// Author id of the current session, `None` when signed out
    fn current_author(&self) -> Option<String>;
}

/// Session set explicitly by the caller (CLI flag, tests)
#[derive(Debug, Default)]
pub struct StaticIdentity {
    author: RwLock<Option<String>>,
}

impl StaticIdentity {
    pub fn signed_in(author: impl Into<String>) -> Self {
        Self {
            author: RwLock::new(Some(author.into())),
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, author: impl Into<String>) {
        *self.author.write().unwrap() = Some(author.into());
    }

    pub fn sign_out(&self) {
        *self.author.write().unwrap() = None;
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_author(&self) -> Option<String> {
        self.author
            .read()
            .unwrap()
            .clone()
            .filter(|a| !a.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_lifecycle() {
        let identity = StaticIdentity::signed_out();
        assert_eq!(identity.current_author(), None);
        identity.sign_in("did:example:me");
        assert_eq!(identity.current_author().as_deref(), Some("did:example:me"));
        identity.sign_out();
        assert_eq!(identity.current_author(), None);
    }

    #[test]
    fn blank_author_counts_as_signed_out() {
        assert_eq!(StaticIdentity::signed_in("  ").current_author(), None);
    }
}
