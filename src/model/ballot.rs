use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::{
    candidate::CandidateId,
    token::{format_timestamp, TokenCode},
};

/// A submitted ballot, as recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ballot {
    /// Kept for audit only.
    pub token: TokenCode,
    pub candidate_ids: Vec<CandidateId>,
    /// Display labels, in the same order as `candidate_ids`.
    pub candidate_labels: Vec<String>,
    pub submitted_at: DateTime<Utc>,
}

impl Ballot {
    /// Build a ballot from `(id, label)` choices, enforcing
    /// `0 < count <= max_selections`.
    pub fn new(
        token: TokenCode,
        choices: Vec<(CandidateId, String)>,
        max_selections: usize,
        submitted_at: DateTime<Utc>,
    ) -> Result<Self> {
        check_selection_count(choices.len(), max_selections)?;
        let (candidate_ids, candidate_labels) = choices.into_iter().unzip();
        Ok(Self {
            token,
            candidate_ids,
            candidate_labels,
            submitted_at,
        })
    }

    pub fn count(&self) -> usize {
        self.candidate_ids.len()
    }

    /// Flatten into the ledger's column layout.
    pub fn to_record(&self) -> LedgerRecord {
        LedgerRecord {
            token: self.token.to_string(),
            candidate_ids: self
                .candidate_ids
                .iter()
                .map(CandidateId::as_str)
                .collect::<Vec<_>>()
                .join(";"),
            candidate_labels: self.candidate_labels.join("; "),
            count: self.count(),
            submitted_at: format_timestamp(self.submitted_at),
        }
    }
}

/// Check a selection size against the cap.
pub fn check_selection_count(count: usize, max_selections: usize) -> Result<()> {
    if count == 0 {
        Err(Error::EmptySelection)
    } else if count > max_selections {
        Err(Error::SelectionLimitExceeded {
            count,
            max: max_selections,
        })
    } else {
        Ok(())
    }
}

/// One ledger row. Field names match the spreadsheet headers and the remote
/// list's column names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    #[serde(rename = "Token")]
    pub token: String,
    #[serde(rename = "SeleccionadosIDs")]
    pub candidate_ids: String,
    #[serde(rename = "SeleccionadosNombres")]
    pub candidate_labels: String,
    #[serde(rename = "Cantidad")]
    pub count: usize,
    #[serde(rename = "Fecha")]
    pub submitted_at: String,
}

/// What the voter gets back after a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub count: usize,
    pub candidates: Vec<String>,
    pub submitted_at: DateTime<Utc>,
}

impl From<&Ballot> for Receipt {
    fn from(ballot: &Ballot) -> Self {
        Self {
            count: ballot.count(),
            candidates: ballot.candidate_labels.clone(),
            submitted_at: ballot.submitted_at,
        }
    }
}
