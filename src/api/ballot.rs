use rocket::{http::CookieJar, serde::json::Json, Route, State};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    model::{
        ballot::Receipt,
        candidate::CandidateId,
        roster::{Roster, RosterFilter, ALL_DIVISIONS},
        selection::{Selection, ViewEntry},
        session::VotingSession,
        storage::Storage,
    },
    Config,
};

pub fn routes() -> Vec<Route> {
    routes![view, update_selection, submit]
}

/// One candidate as shown on the ballot screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRow {
    pub id: CandidateId,
    pub label: String,
    pub division: String,
    pub is_volunteer: bool,
    pub checked: bool,
}

/// Selection counters shared by the ballot and selection responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionStatus {
    pub selected_count: usize,
    pub max_selections: usize,
    pub over_limit: bool,
    pub can_submit: bool,
    /// Inline message shown while the selection is over the limit.
    pub error: Option<String>,
}

impl SelectionStatus {
    fn new(selection: &Selection, max_selections: usize) -> Self {
        let selected_count = selection.len();
        let over_limit = selected_count > max_selections;
        Self {
            selected_count,
            max_selections,
            over_limit,
            can_submit: selected_count > 0 && !over_limit,
            error: over_limit.then(|| {
                Error::SelectionLimitExceeded {
                    count: selected_count,
                    max: max_selections,
                }
                .user_message()
            }),
        }
    }
}

/// The ballot screen: filtered candidates plus selection state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotView {
    pub matches: usize,
    pub candidates: Vec<CandidateRow>,
    /// Division filter choices, starting with the "all divisions" entry.
    pub divisions: Vec<String>,
    #[serde(flatten)]
    pub status: SelectionStatus,
}

impl BallotView {
    fn new(roster: &Roster, filter: &RosterFilter, selection: &Selection, max: usize) -> Self {
        let candidates: Vec<CandidateRow> = roster
            .filter(filter)
            .map(|c| CandidateRow {
                id: c.id.clone(),
                label: c.label.clone(),
                division: c.division.clone(),
                is_volunteer: c.is_volunteer,
                checked: selection.contains(&c.id),
            })
            .collect();
        let divisions = std::iter::once(ALL_DIVISIONS)
            .chain(roster.divisions())
            .map(str::to_string)
            .collect();
        Self {
            matches: candidates.len(),
            candidates,
            divisions,
            status: SelectionStatus::new(selection, max),
        }
    }
}

/// Checkbox states of the candidates currently on screen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionUpdate {
    pub visible: Vec<ViewEntry>,
}

/// The authoritative selection after an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionView {
    pub selected: Vec<CandidateId>,
    pub changed: bool,
    #[serde(flatten)]
    pub status: SelectionStatus,
}

#[get("/ballot?<filter..>")]
pub fn view(
    filter: RosterFilter,
    session: VotingSession,
    roster: &State<Roster>,
    config: &State<Config>,
) -> Result<Json<BallotView>> {
    let selection = session.selection()?;
    Ok(Json(BallotView::new(
        roster,
        &filter,
        selection,
        config.max_selections(),
    )))
}

#[put("/ballot/selection", data = "<update>", format = "json")]
pub fn update_selection(
    update: Json<SelectionUpdate>,
    mut session: VotingSession,
    cookies: &CookieJar<'_>,
    roster: &State<Roster>,
    config: &State<Config>,
) -> Result<Json<SelectionView>> {
    let changed =
        session.update_selection(&update.visible, roster, config.max_selections())?;
    cookies.add_private(session.to_cookie(config)?);

    let selection = session.selection()?;
    Ok(Json(SelectionView {
        selected: selection.ids().cloned().collect(),
        changed,
        status: SelectionStatus::new(selection, config.max_selections()),
    }))
}

#[post("/ballot/submit")]
pub async fn submit(
    mut session: VotingSession,
    cookies: &CookieJar<'_>,
    roster: &State<Roster>,
    storage: &State<Storage>,
    config: &State<Config>,
) -> Result<Json<Receipt>> {
    let ballot = session
        .submit(roster, storage, config.max_selections())
        .await?;
    cookies.add_private(session.to_cookie(config)?);
    Ok(Json(Receipt::from(&ballot)))
}
