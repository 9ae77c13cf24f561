//! One-time download token registry.
//!
//! Maps a freshly minted [`Token`] to the output [`Artifact`] it unlocks.
//! The registry owns the artifact while it waits; [`TokenRegistry::redeem`]
//! removes the entry and hands ownership to the caller in one step, so a
//! token can be redeemed at most once no matter how callers race.
//!
//! The lock only guards the map mutation. Artifacts leaving the registry are
//! released by their new owner, outside the lock.

use crate::artifacts::Artifact;
use clipforge_common::{Error, Result, Token};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Process-wide token → artifact map with exactly-once redemption.
#[derive(Debug, Default)]
pub struct TokenRegistry {
    entries: Mutex<HashMap<Token, Artifact>>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an artifact and return the token that unlocks it.
    ///
    /// Tokens are 128 random bits; collisions are not checked.
    pub fn mint(&self, artifact: Artifact) -> Token {
        let token = Token::generate();
        let path = artifact.path().display().to_string();
        let previous = self.entries.lock().insert(token, artifact);
        debug_assert!(previous.is_none(), "token collision");
        tracing::debug!(token = ?token, path = %path, "Download token minted");
        token
    }

    /// Remove the entry for `token` and return its artifact.
    ///
    /// The entry is gone after the first call whether or not the backing file
    /// still exists; every later call fails with [`Error::NotFound`].
    pub fn redeem(&self, token: &Token) -> Result<Artifact> {
        let removed = self.entries.lock().remove(token);
        match removed {
            Some(artifact) => {
                tracing::debug!(token = ?token, path = %artifact.path().display(), "Download token redeemed");
                Ok(artifact)
            }
            None => Err(Error::not_found("download token")),
        }
    }

    /// Number of live tokens.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Remove every entry, returning the abandoned artifacts.
    ///
    /// Used at shutdown; dropping the returned artifacts deletes their files.
    pub fn drain(&self) -> Vec<Artifact> {
        let drained: Vec<Artifact> = self.entries.lock().drain().map(|(_, a)| a).collect();
        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "Releasing unredeemed downloads");
        }
        drained
    }
}
