//! Durable token and ballot storage.
//!
//! The [`TokenStore`] and [`VoteLedger`] traits are implemented by a local
//! spreadsheet backend and a remote list API backend. [`Storage`] pairs one of
//! each and owns the ordered ballot commit.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rocket::tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::model::{
    ballot::Ballot,
    token::{AccessToken, TokenCode},
};

pub mod graph;
pub mod spreadsheet;

/// One-time access codes.
#[rocket::async_trait]
pub trait TokenStore: Send + Sync {
    /// Find a token by exact match on its normalised code.
    async fn lookup(&self, token: &TokenCode) -> Result<Option<AccessToken>>;

    /// Has this token been used? Unknown tokens report `false`; callers must
    /// check existence with [`TokenStore::lookup`] first.
    async fn is_used(&self, token: &TokenCode) -> Result<bool> {
        Ok(self
            .lookup(token)
            .await?
            .map(|record| record.used)
            .unwrap_or(false))
    }

    /// Mark the token used at `at`, only if it is currently unused.
    ///
    /// Fails with [`Error::TokenNotFound`] for unknown tokens and
    /// [`Error::TokenAlreadyUsed`] if another submission got there first.
    async fn mark_used(&self, token: &TokenCode, at: DateTime<Utc>) -> Result<()>;
}

/// Append-only record of submitted ballots.
#[rocket::async_trait]
pub trait VoteLedger: Send + Sync {
    /// Durably record `ballot`. No uniqueness is enforced here.
    async fn append(&self, ballot: &Ballot) -> Result<()>;
}

/// The token store and ledger in use, shared by every voter session.
pub struct Storage {
    tokens: Arc<dyn TokenStore>,
    ledger: Arc<dyn VoteLedger>,
    commit_lock: Mutex<()>,
}

impl Storage {
    pub fn new(tokens: Arc<dyn TokenStore>, ledger: Arc<dyn VoteLedger>) -> Self {
        Self {
            tokens,
            ledger,
            commit_lock: Mutex::new(()),
        }
    }

    pub fn tokens(&self) -> &dyn TokenStore {
        self.tokens.as_ref()
    }

    /// Record `ballot` and consume its token.
    ///
    /// The ballot is appended before the token is marked used, so a failure in
    /// between leaves the token usable. Commits are serialised in-process, and
    /// the token is re-checked under the lock (existence first, then use) so
    /// neither a spent nor a vanished token can reach the ledger.
    pub async fn commit(&self, ballot: &Ballot) -> Result<()> {
        let _guard = self.commit_lock.lock().await;

        match self.tokens.lookup(&ballot.token).await? {
            None => {
                warn!("Rejecting ballot: access code no longer exists");
                return Err(Error::InvalidToken);
            }
            Some(record) if record.used => {
                warn!("Rejecting ballot: access code was used by another session");
                return Err(Error::TokenAlreadyUsed);
            }
            Some(_) => {}
        }

        self.ledger.append(ballot).await?;

        if let Err(e) = self.tokens.mark_used(&ballot.token, ballot.submitted_at).await {
            error!("Ballot recorded but access code could not be marked used: {e}");
            return Err(e);
        }

        info!("Recorded ballot with {} selections", ballot.count());
        Ok(())
    }
}

/// In-memory stores for unit tests.
#[cfg(test)]
pub mod memory {
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    use super::*;

    #[derive(Default)]
    pub struct MemoryTokens(StdMutex<HashMap<TokenCode, AccessToken>>);

    impl MemoryTokens {
        pub fn with(tokens: &[(&str, bool)]) -> Self {
            let map = tokens
                .iter()
                .map(|&(code, used)| {
                    let mut token = AccessToken::new(code.into());
                    if used {
                        token.consume(Utc::now());
                    }
                    (token.token.clone(), token)
                })
                .collect();
            Self(StdMutex::new(map))
        }

        pub fn get(&self, code: &str) -> Option<AccessToken> {
            self.0.lock().unwrap().get(&TokenCode::from(code)).cloned()
        }
    }

    #[rocket::async_trait]
    impl TokenStore for MemoryTokens {
        async fn lookup(&self, token: &TokenCode) -> Result<Option<AccessToken>> {
            Ok(self.0.lock().unwrap().get(token).cloned())
        }

        async fn mark_used(&self, token: &TokenCode, at: DateTime<Utc>) -> Result<()> {
            let mut map = self.0.lock().unwrap();
            let record = map
                .get_mut(token)
                .ok_or_else(|| Error::TokenNotFound(token.to_string()))?;
            if record.consume(at) {
                Ok(())
            } else {
                Err(Error::TokenAlreadyUsed)
            }
        }
    }

    #[derive(Default)]
    pub struct MemoryLedger(pub StdMutex<Vec<Ballot>>);

    impl MemoryLedger {
        pub fn ballots(&self) -> Vec<Ballot> {
            self.0.lock().unwrap().clone()
        }
    }

    #[rocket::async_trait]
    impl VoteLedger for MemoryLedger {
        async fn append(&self, ballot: &Ballot) -> Result<()> {
            self.0.lock().unwrap().push(ballot.clone());
            Ok(())
        }
    }

    /// A ledger whose writes always fail.
    pub struct FailingLedger;

    #[rocket::async_trait]
    impl VoteLedger for FailingLedger {
        async fn append(&self, _ballot: &Ballot) -> Result<()> {
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::*;
    use super::*;

    fn ballot(token: &str) -> Ballot {
        Ballot::new(
            token.into(),
            vec![("11111111-1".into(), "Jane Doe".to_string())],
            6,
            Utc::now(),
        )
        .unwrap()
    }

    #[rocket::async_test]
    async fn commit_appends_then_marks() {
        let tokens = Arc::new(MemoryTokens::with(&[("AB1234", false)]));
        let ledger = Arc::new(MemoryLedger::default());
        let storage = Storage::new(tokens.clone(), ledger.clone());

        storage.commit(&ballot("AB1234")).await.unwrap();

        assert_eq!(1, ledger.ballots().len());
        let record = tokens.get("AB1234").unwrap();
        assert!(record.used);
        assert!(record.used_at.is_some());
    }

    #[rocket::async_test]
    async fn failed_append_leaves_token_unused() {
        let tokens = Arc::new(MemoryTokens::with(&[("AB1234", false)]));
        let storage = Storage::new(tokens.clone(), Arc::new(FailingLedger));

        let result = storage.commit(&ballot("AB1234")).await;

        assert!(matches!(result, Err(Error::Io(_))));
        assert!(!tokens.get("AB1234").unwrap().used);
    }

    #[rocket::async_test]
    async fn replay_never_reaches_ledger() {
        let tokens = Arc::new(MemoryTokens::with(&[("AB1234", false)]));
        let ledger = Arc::new(MemoryLedger::default());
        let storage = Storage::new(tokens, ledger.clone());

        storage.commit(&ballot("AB1234")).await.unwrap();
        let second = storage.commit(&ballot("AB1234")).await;

        assert!(matches!(second, Err(Error::TokenAlreadyUsed)));
        assert_eq!(1, ledger.ballots().len());
    }

    #[rocket::async_test]
    async fn missing_token_never_reaches_ledger() {
        let ledger = Arc::new(MemoryLedger::default());
        let storage = Storage::new(Arc::new(MemoryTokens::with(&[])), ledger.clone());

        let first = storage.commit(&ballot("AB1234")).await;
        let second = storage.commit(&ballot("AB1234")).await;

        assert!(matches!(first, Err(Error::InvalidToken)));
        assert!(matches!(second, Err(Error::InvalidToken)));
        assert!(ledger.ballots().is_empty());
    }

    #[rocket::async_test]
    async fn concurrent_commits_with_one_token() {
        let tokens = Arc::new(MemoryTokens::with(&[("AB1234", false)]));
        let ledger = Arc::new(MemoryLedger::default());
        let storage = Arc::new(Storage::new(tokens, ledger.clone()));

        let a = rocket::tokio::spawn({
            let storage = storage.clone();
            async move { storage.commit(&ballot("AB1234")).await }
        });
        let b = rocket::tokio::spawn({
            let storage = storage.clone();
            async move { storage.commit(&ballot("AB1234")).await }
        });
        let results = [a.await.unwrap(), b.await.unwrap()];

        assert_eq!(1, results.iter().filter(|r| r.is_ok()).count());
        assert_eq!(1, ledger.ballots().len());
    }

    #[rocket::async_test]
    async fn unknown_token_is_not_used() {
        let tokens = MemoryTokens::with(&[]);
        assert!(!tokens.is_used(&"NOPE".into()).await.unwrap());
        assert!(tokens.lookup(&"NOPE".into()).await.unwrap().is_none());
        assert!(matches!(
            tokens.mark_used(&"NOPE".into(), Utc::now()).await,
            Err(Error::TokenNotFound(_))
        ));
    }
}
