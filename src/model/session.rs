use std::convert::Infallible;

use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation};
use rocket::{
    http::{Cookie, SameSite},
    request::{self, FromRequest},
    Request, State,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    Config,
};

use super::{
    ballot::{check_selection_count, Ballot},
    roster::Roster,
    selection::{Selection, ViewEntry},
    storage::{Storage, TokenStore},
    token::TokenCode,
};

pub const SESSION_COOKIE: &str = "voting_session";

/// Which screen the voter should be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    Login,
    Ballot,
    ThankYou,
}

/// One voter's progress through the protocol. `Submitted` is terminal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum VotingSession {
    #[default]
    Unauthenticated,
    Authenticated {
        token: TokenCode,
        selected: Selection,
    },
    Submitted,
}

impl VotingSession {
    pub fn screen(&self) -> Screen {
        match self {
            Self::Unauthenticated => Screen::Login,
            Self::Authenticated { .. } => Screen::Ballot,
            Self::Submitted => Screen::ThankYou,
        }
    }

    /// The current selection, if the voter is on the ballot screen.
    pub fn selection(&self) -> Result<&Selection> {
        match self {
            Self::Authenticated { selected, .. } => Ok(selected),
            Self::Unauthenticated => Err(Error::NotAuthenticated),
            Self::Submitted => Err(Error::SessionClosed),
        }
    }

    /// Number of selected candidates, zero outside the ballot screen.
    pub fn selected_count(&self) -> usize {
        self.selection().map(Selection::len).unwrap_or(0)
    }

    /// Authenticate with a raw access code.
    ///
    /// The code is normalised, then checked for emptiness, existence and
    /// prior use, in that order.
    pub async fn login(&mut self, raw: &str, tokens: &dyn TokenStore) -> Result<()> {
        match self {
            Self::Unauthenticated => {}
            Self::Authenticated { .. } => return Err(Error::AlreadyAuthenticated),
            Self::Submitted => return Err(Error::SessionClosed),
        }

        let token = TokenCode::normalize(raw);
        if token.is_empty() {
            return Err(Error::EmptyToken);
        }
        if tokens.lookup(&token).await?.is_none() {
            return Err(Error::InvalidToken);
        }
        if tokens.is_used(&token).await? {
            return Err(Error::TokenAlreadyUsed);
        }

        info!("Voter authenticated");
        *self = Self::Authenticated {
            token,
            selected: Selection::default(),
        };
        Ok(())
    }

    /// Apply the checkbox states of the visible candidates. Returns whether
    /// the selection changed.
    ///
    /// A selection may go over `max_selections`, but once over it can only
    /// shrink; an update that would grow it further is refused and leaves the
    /// selection as it was.
    pub fn update_selection(
        &mut self,
        view: &[ViewEntry],
        roster: &Roster,
        max_selections: usize,
    ) -> Result<bool> {
        match self {
            Self::Authenticated { selected, .. } => {
                let mut updated = selected.clone();
                let changed = updated.apply_view(view, roster);
                if selected.len() > max_selections && updated.len() > selected.len() {
                    return Err(Error::SelectionLimitExceeded {
                        count: updated.len(),
                        max: max_selections,
                    });
                }
                *selected = updated;
                Ok(changed)
            }
            Self::Unauthenticated => Err(Error::NotAuthenticated),
            Self::Submitted => Err(Error::SessionClosed),
        }
    }

    /// Submit the current selection as a ballot.
    ///
    /// On success the session becomes `Submitted`. On any failure the session
    /// is left authenticated with its selection intact.
    pub async fn submit(
        &mut self,
        roster: &Roster,
        storage: &Storage,
        max_selections: usize,
    ) -> Result<Ballot> {
        let (token, selected) = match self {
            Self::Authenticated { token, selected } => (token, selected),
            Self::Unauthenticated => return Err(Error::NotAuthenticated),
            Self::Submitted => return Err(Error::SessionClosed),
        };

        selected.prune(roster);
        check_selection_count(selected.len(), max_selections)?;

        let choices = selected
            .ids()
            .filter_map(|id| roster.get(id))
            .map(|candidate| (candidate.id.clone(), candidate.label.clone()))
            .collect();
        let ballot = Ballot::new(token.clone(), choices, max_selections, Utc::now())?;

        storage.commit(&ballot).await?;

        *self = Self::Submitted;
        Ok(ballot)
    }

    /// Encode into a browser-session cookie. The JWT inside expires after the
    /// configured session lifetime.
    pub fn to_cookie(&self, config: &Config) -> Result<Cookie<'static>> {
        let claims = Claims {
            session: self.clone(),
            expire_at: Utc::now() + config.session_ttl(),
        };
        let jwt = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )?;
        Ok(Cookie::build(SESSION_COOKIE, jwt)
            .http_only(true)
            .same_site(SameSite::Strict)
            .finish())
    }

    /// Decode a session from its cookie.
    pub fn from_cookie(cookie: &Cookie<'static>, config: &Config) -> Result<Self> {
        let data: TokenData<Claims> = jsonwebtoken::decode(
            cookie.value(),
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )?;
        Ok(data.claims.session)
    }
}

/// Cookie claims: the session plus an expiry datetime.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    #[serde(rename = "ses")]
    session: VotingSession,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

/// A missing, expired or tampered cookie is a fresh session.
#[rocket::async_trait]
impl<'r> FromRequest<'r> for VotingSession {
    type Error = Infallible;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let config = req.guard::<&State<Config>>().await.unwrap(); // Valid as `Config` is always managed

        let session = match req.cookies().get_private(SESSION_COOKIE) {
            Some(cookie) => VotingSession::from_cookie(&cookie, config).unwrap_or_else(|e| {
                warn!("Discarding unreadable session cookie: {e}");
                VotingSession::default()
            }),
            None => VotingSession::default(),
        };
        request::Outcome::Success(session)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use crate::model::{
        candidate::{Candidate, CandidateId},
        storage::memory::{MemoryLedger, MemoryTokens},
    };

    use super::*;

    fn roster() -> Roster {
        Roster::from_candidates(
            (1..=8)
                .map(|i| Candidate::new(format!("{i}").into(), &format!("Person {i}"), "", false))
                .collect(),
        )
        .unwrap()
    }

    fn storage(tokens: &[(&str, bool)]) -> (Arc<MemoryTokens>, Arc<MemoryLedger>, Storage) {
        let tokens = Arc::new(MemoryTokens::with(tokens));
        let ledger = Arc::new(MemoryLedger::default());
        let storage = Storage::new(tokens.clone(), ledger.clone());
        (tokens, ledger, storage)
    }

    fn check(ids: &[&str]) -> Vec<ViewEntry> {
        ids.iter()
            .map(|id| ViewEntry {
                id: CandidateId::from(*id),
                checked: true,
            })
            .collect()
    }

    #[rocket::async_test]
    async fn login_checks_in_order() {
        let tokens = MemoryTokens::with(&[("AB1234", false), ("EF9012", true)]);
        let mut session = VotingSession::default();

        let cases = [
            ("  - ", "empty_token"),
            ("ZZ9999", "invalid_token"),
            ("ef 90-12", "token_already_used"),
        ];
        for (raw, expected) in cases {
            let err = session.login(raw, &tokens).await.unwrap_err();
            assert_eq!(expected, err.kind());
            assert_eq!(VotingSession::Unauthenticated, session);
        }

        session.login("ab-12 34", &tokens).await.unwrap();
        assert_eq!(Screen::Ballot, session.screen());
        assert!(matches!(
            session.login("AB1234", &tokens).await,
            Err(Error::AlreadyAuthenticated)
        ));
    }

    #[rocket::async_test]
    async fn submit_records_and_closes() {
        let (tokens, ledger, storage) = storage(&[("AB1234", false)]);
        let roster = roster();
        let mut session = VotingSession::default();
        session.login("AB1234", storage.tokens()).await.unwrap();

        assert!(session.update_selection(&check(&["2", "1"]), &roster, 6).unwrap());
        let ballot = session.submit(&roster, &storage, 6).await.unwrap();

        assert_eq!(vec![CandidateId::from("1"), "2".into()], ballot.candidate_ids);
        assert_eq!(vec!["Person 1", "Person 2"], ballot.candidate_labels);
        assert_eq!(Screen::ThankYou, session.screen());
        assert_eq!(1, ledger.ballots().len());
        assert!(tokens.get("AB1234").unwrap().used);

        // Everything after submission is refused.
        assert!(matches!(
            session.update_selection(&check(&["3"]), &roster, 6),
            Err(Error::SessionClosed)
        ));
        assert!(matches!(
            session.submit(&roster, &storage, 6).await,
            Err(Error::SessionClosed)
        ));
        assert!(matches!(
            session.login("AB1234", storage.tokens()).await,
            Err(Error::SessionClosed)
        ));
        assert_eq!(1, ledger.ballots().len());
    }

    #[rocket::async_test]
    async fn bad_counts_never_reach_ledger() {
        let (tokens, ledger, storage) = storage(&[("AB1234", false)]);
        let roster = roster();
        let mut session = VotingSession::default();
        session.login("AB1234", storage.tokens()).await.unwrap();

        assert!(matches!(
            session.submit(&roster, &storage, 6).await,
            Err(Error::EmptySelection)
        ));

        session
            .update_selection(&check(&["1", "2", "3", "4", "5", "6", "7"]), &roster, 6)
            .unwrap();
        assert_eq!(7, session.selected_count());
        assert!(matches!(
            session.submit(&roster, &storage, 6).await,
            Err(Error::SelectionLimitExceeded { count: 7, max: 6 })
        ));

        assert_eq!(Screen::Ballot, session.screen());
        assert!(ledger.ballots().is_empty());
        assert!(!tokens.get("AB1234").unwrap().used);
    }

    #[rocket::async_test]
    async fn over_limit_selection_only_shrinks() {
        let (_, _, storage) = storage(&[("AB1234", false)]);
        let roster = roster();
        let mut session = VotingSession::default();
        session.login("AB1234", storage.tokens()).await.unwrap();

        session
            .update_selection(&check(&["1", "2", "3", "4", "5", "6", "7"]), &roster, 6)
            .unwrap();
        assert!(matches!(
            session.update_selection(&check(&["8"]), &roster, 6),
            Err(Error::SelectionLimitExceeded { count: 8, max: 6 })
        ));
        assert_eq!(7, session.selected_count());

        // Swapping one candidate for another keeps the size and is allowed.
        let swap = [
            ViewEntry {
                id: "7".into(),
                checked: false,
            },
            ViewEntry {
                id: "8".into(),
                checked: true,
            },
        ];
        assert!(session.update_selection(&swap, &roster, 6).unwrap());
        assert_eq!(7, session.selected_count());

        let uncheck = [ViewEntry {
            id: "8".into(),
            checked: false,
        }];
        assert!(session.update_selection(&uncheck, &roster, 6).unwrap());
        assert_eq!(6, session.selected_count());
    }

    #[rocket::async_test]
    async fn token_used_elsewhere_blocks_submit() {
        let (tokens, ledger, storage) = storage(&[("AB1234", false)]);
        let roster = roster();
        let mut first = VotingSession::default();
        let mut second = VotingSession::default();
        first.login("AB1234", storage.tokens()).await.unwrap();
        second.login("AB1234", storage.tokens()).await.unwrap();

        first.update_selection(&check(&["1"]), &roster, 6).unwrap();
        second.update_selection(&check(&["2"]), &roster, 6).unwrap();
        first.submit(&roster, &storage, 6).await.unwrap();

        assert!(matches!(
            second.submit(&roster, &storage, 6).await,
            Err(Error::TokenAlreadyUsed)
        ));
        assert_eq!(Screen::Ballot, second.screen());
        assert_eq!(1, ledger.ballots().len());
        assert!(tokens.get("AB1234").unwrap().used);
    }

    #[test]
    fn unauthenticated_actions_are_refused() {
        let mut session = VotingSession::default();
        assert!(matches!(
            session.update_selection(&[], &roster(), 6),
            Err(Error::NotAuthenticated)
        ));
        assert_eq!(0, session.selected_count());
    }

    #[test]
    fn cookie_round_trip_and_tampering() {
        let config = Config::example();
        let session = VotingSession::Authenticated {
            token: "AB1234".into(),
            selected: [CandidateId::from("1")].into_iter().collect(),
        };

        let cookie = session.to_cookie(&config).unwrap();
        assert_eq!(SESSION_COOKIE, cookie.name());
        assert_eq!(Some(true), cookie.http_only());
        assert_eq!(None, cookie.max_age());
        assert_eq!(session, VotingSession::from_cookie(&cookie, &config).unwrap());

        let tampered = Cookie::new(SESSION_COOKIE, format!("{}x", cookie.value()));
        assert!(VotingSession::from_cookie(&tampered, &config).is_err());
    }

    #[test]
    fn expired_cookie_is_rejected() {
        let config = Config::example();
        let claims = Claims {
            session: VotingSession::Submitted,
            expire_at: Utc::now() - Duration::hours(1),
        };
        let jwt = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )
        .unwrap();
        let cookie = Cookie::new(SESSION_COOKIE, jwt);
        assert!(matches!(
            VotingSession::from_cookie(&cookie, &config),
            Err(Error::Jwt(_))
        ));
    }
}
