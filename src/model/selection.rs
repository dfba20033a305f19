//! Tracking the voter's checked candidates across partial views of the
//! roster.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{candidate::CandidateId, roster::Roster};

/// Checkbox state of one candidate as currently rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewEntry {
    pub id: CandidateId,
    pub checked: bool,
}

/// The authoritative set of selected candidates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selection(BTreeSet<CandidateId>);

impl Selection {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, id: &CandidateId) -> bool {
        self.0.contains(id)
    }

    /// Selected IDs in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = &CandidateId> {
        self.0.iter()
    }

    /// Adopt the checkbox states of the visible candidates. Candidates not in
    /// `view` keep their state. Afterwards anything not on `roster` is
    /// dropped. Returns whether the selection changed.
    pub fn apply_view(&mut self, view: &[ViewEntry], roster: &Roster) -> bool {
        let before = self.0.clone();
        for entry in view {
            if entry.checked {
                self.0.insert(entry.id.clone());
            } else {
                self.0.remove(&entry.id);
            }
        }
        self.prune(roster);
        self.0 != before
    }

    /// Drop IDs that are not on `roster`.
    pub fn prune(&mut self, roster: &Roster) {
        self.0.retain(|id| roster.contains(id));
    }
}

impl FromIterator<CandidateId> for Selection {
    fn from_iter<I: IntoIterator<Item = CandidateId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
