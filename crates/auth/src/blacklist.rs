//! Access tokens invalidated before their natural expiry.

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

/// Set of explicitly invalidated access tokens.
///
/// Injected into the session manager so that tests get an isolated set and a
/// shared external store can replace the in-process one.
pub trait AccessTokenBlacklist: Send + Sync {
    fn insert(&self, token: &str);

    fn contains(&self, token: &str) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local blacklist.
///
/// Entries are never pruned: a token stays listed after it would have expired
/// anyway, so the set grows with logout traffic until the process restarts.
#[derive(Debug, Default)]
pub struct InMemoryBlacklist {
    tokens: RwLock<HashSet<String>>,
}

impl InMemoryBlacklist {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccessTokenBlacklist for InMemoryBlacklist {
    fn insert(&self, token: &str) {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.to_string());
    }

    fn contains(&self, token: &str) -> bool {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(token)
    }

    fn len(&self) -> usize {
        self.tokens.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn membership_reflects_inserts() {
        let blacklist = InMemoryBlacklist::new();
        assert!(blacklist.is_empty());

        blacklist.insert("a");
        blacklist.insert("a");
        assert!(blacklist.contains("a"));
        assert!(!blacklist.contains("b"));
        assert_eq!(blacklist.len(), 1);
    }

    #[test]
    fn concurrent_inserts_are_all_visible() {
        let blacklist = Arc::new(InMemoryBlacklist::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let blacklist = blacklist.clone();
                std::thread::spawn(move || {
                    for j in 0..100 {
                        blacklist.insert(&format!("{i}-{j}"));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(blacklist.len(), 800);
        assert!(blacklist.contains("7-99"));
    }
}
