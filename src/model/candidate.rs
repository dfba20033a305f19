use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Stable candidate identifier: national ID with check digit where the
/// roster has one, row position otherwise.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(String);

impl CandidateId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CandidateId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CandidateId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CandidateId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Suffix marking volunteer candidates in their label.
pub const VOLUNTEER_SUFFIX: &str = "  [Voluntario]";

/// An eligible candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub label: String,
    pub division: String,
    pub is_volunteer: bool,
}

impl Candidate {
    /// Build a candidate, decorating `name` into the display label.
    pub fn new(id: CandidateId, name: &str, division: &str, is_volunteer: bool) -> Self {
        let name = name.trim();
        let division = division.trim();
        let mut label = if division.is_empty() {
            name.to_string()
        } else {
            format!("{name} — ({division})")
        };
        if is_volunteer {
            label.push_str(VOLUNTEER_SUFFIX);
        }
        Self {
            id,
            label,
            division: division.to_string(),
            is_volunteer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volunteer_with_division() {
        let candidate = Candidate::new("1".into(), "Jane Doe", "Finance", true);
        assert_eq!("Jane Doe — (Finance)  [Voluntario]", candidate.label);
    }

    #[test]
    fn plain_labels() {
        assert_eq!("John Roe", Candidate::new("2".into(), "John Roe ", "", false).label);
        assert_eq!(
            "John Roe — (Legal)",
            Candidate::new("2".into(), "John Roe", " Legal", false).label
        );
        assert_eq!(
            "Ana  [Voluntario]",
            Candidate::new("3".into(), "Ana", "", true).label
        );
    }
}
