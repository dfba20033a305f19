use rocket::{
    http::{Cookie, CookieJar, Status},
    serde::json::Json,
    Route, State,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    model::{
        session::{VotingSession, SESSION_COOKIE},
        storage::Storage,
    },
    Config,
};

use super::session::SessionView;

pub fn routes() -> Vec<Route> {
    routes![login, logout]
}

/// The access code as typed by the voter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub code: String,
}

#[cfg(test)]
impl LoginRequest {
    pub fn new(code: &str) -> Self {
        Self {
            code: code.to_string(),
        }
    }

    /// An unused code from the seeded test data, typed sloppily.
    pub fn example() -> Self {
        Self::new("ab-12 34")
    }
}

#[post("/auth", data = "<request>", format = "json")]
pub async fn login(
    request: Json<LoginRequest>,
    mut session: VotingSession,
    cookies: &CookieJar<'_>,
    storage: &State<Storage>,
    config: &State<Config>,
) -> Result<Json<SessionView>> {
    session.login(&request.code, storage.tokens()).await?;
    cookies.add_private(session.to_cookie(config)?);
    Ok(Json(SessionView::new(&session, config)))
}

#[delete("/auth")]
pub fn logout(cookies: &CookieJar) -> Status {
    cookies.remove_private(Cookie::named(SESSION_COOKIE));
    Status::Ok
}
