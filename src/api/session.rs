use rocket::{serde::json::Json, Route, State};
use serde::{Deserialize, Serialize};

use crate::{
    model::session::{Screen, VotingSession},
    Config,
};

pub fn routes() -> Vec<Route> {
    routes![status]
}

/// Where the voter is in the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub screen: Screen,
    pub max_selections: usize,
    pub selected_count: usize,
}

impl SessionView {
    pub fn new(session: &VotingSession, config: &Config) -> Self {
        Self {
            screen: session.screen(),
            max_selections: config.max_selections(),
            selected_count: session.selected_count(),
        }
    }
}

#[get("/session")]
pub fn status(session: VotingSession, config: &State<Config>) -> Json<SessionView> {
    Json(SessionView::new(&session, config))
}

#[cfg(test)]
mod tests {
    use rocket::{http::Status, local::asynchronous::Client};

    use super::*;

    #[backend_test]
    async fn fresh_session_is_login(client: Client) {
        let response = client.get(uri!(status)).dispatch().await;

        assert_eq!(Status::Ok, response.status());
        let view = response.into_json::<SessionView>().await.unwrap();
        assert_eq!(
            SessionView {
                screen: Screen::Login,
                max_selections: 6,
                selected_count: 0,
            },
            view
        );
    }

    #[backend_test(voter)]
    async fn logged_in_session_is_ballot(client: Client) {
        let view = client
            .get(uri!(status))
            .dispatch()
            .await
            .into_json::<SessionView>()
            .await
            .unwrap();
        assert_eq!(Screen::Ballot, view.screen);
    }

    #[backend_test]
    async fn garbage_cookie_is_fresh_session(client: Client) {
        let response = client
            .get(uri!(status))
            .private_cookie(rocket::http::Cookie::new(
                crate::model::session::SESSION_COOKIE,
                "not-a-jwt",
            ))
            .dispatch()
            .await;

        assert_eq!(Status::Ok, response.status());
        let view = response.into_json::<SessionView>().await.unwrap();
        assert_eq!(Screen::Login, view.screen);
    }
}
