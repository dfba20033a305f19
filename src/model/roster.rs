//! Loading the candidate roster from a tabular source.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use data_encoding::HEXLOWER;
use rocket::FromForm;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

use super::{
    candidate::{Candidate, CandidateId},
    table::Table,
    text::{collapse_whitespace, is_truthy},
};

const NAME_COLUMNS: &[&str] = &[
    "NOMRES A UTILIZAR  PARA VOTAR",
    "NOMBRES A UTILIZAR  PARA VOTAR",
    "NOMBRES A UTILIZAR PARA VOTAR",
    "NOMBRE A UTILIZAR PARA VOTAR",
    "NOMBRES",
];
const GIVEN_NAME_COLUMNS: &[&str] = &["NOMBRES", "NOMBRE"];
const FIRST_SURNAME_COLUMNS: &[&str] = &["PRIMER APELLIDO"];
const SECOND_SURNAME_COLUMNS: &[&str] = &["SEGUNDO APELLIDO"];
const DIVISION_COLUMNS: &[&str] = &[
    "Dependencia/División",
    "Dependencia/Division",
    "Dependencia",
    "División",
    "Division",
];
const RUN_COLUMNS: &[&str] = &["RUN (sin puntos)", "RUN"];
const CHECK_DIGIT_COLUMNS: &[&str] = &["DV"];
const VOLUNTEER_COLUMNS: &[&str] = &["Voluntario"];

/// Division filter value meaning "every division".
pub const ALL_DIVISIONS: &str = "Todas";

/// The ordered list of eligible candidates for this voting round.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    candidates: Vec<Candidate>,
    index: HashMap<CandidateId, usize>,
    fingerprint: String,
}

impl Roster {
    /// Read and build the roster from the file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| Error::config_load(path.display(), e))?;
        let table = Table::load(path)?;
        let mut roster = Self::from_table(&table)
            .map_err(|reason| Error::config_load(path.display(), reason))?;
        roster.fingerprint = HEXLOWER.encode(&Sha256::digest(&bytes));
        Ok(roster)
    }

    /// Derive candidates from a raw table. Rows without a name are dropped;
    /// the result is ordered volunteers first, then by label.
    ///
    /// Fails if two rows derive the same candidate ID.
    pub fn from_table(table: &Table) -> std::result::Result<Self, String> {
        let name_col = table.column(NAME_COLUMNS);
        let given_col = table.column(GIVEN_NAME_COLUMNS);
        let surname1_col = table.column(FIRST_SURNAME_COLUMNS);
        let surname2_col = table.column(SECOND_SURNAME_COLUMNS);
        let division_col = table.column(DIVISION_COLUMNS);
        let run_col = table.column(RUN_COLUMNS);
        let dv_col = table.column(CHECK_DIGIT_COLUMNS);
        let volunteer_col = table.column(VOLUNTEER_COLUMNS);

        if name_col.is_none() {
            debug!("No name column found, composing names from given names and surnames");
        }

        let mut candidates = Vec::new();
        for (idx, row) in table.rows().enumerate() {
            let name = match name_col {
                Some(col) => collapse_whitespace(row.get(col)),
                None => collapse_whitespace(&format!(
                    "{} {} {}",
                    row.get_opt(given_col),
                    row.get_opt(surname1_col),
                    row.get_opt(surname2_col)
                )),
            };
            if name.is_empty() {
                debug!("Skipping roster row {}: empty name", idx + 1);
                continue;
            }

            let run = row.get_opt(run_col).replace('.', "");
            let run = run.trim();
            let id = match (run.is_empty(), dv_col) {
                (true, _) => (idx + 1).to_string(),
                (false, Some(dv)) if !row.get(dv).is_empty() => format!("{run}-{}", row.get(dv)),
                (false, _) => run.to_string(),
            };

            let is_volunteer = is_truthy(row.get_opt(volunteer_col));
            candidates.push(Candidate::new(
                id.into(),
                &name,
                row.get_opt(division_col),
                is_volunteer,
            ));
        }

        Self::from_candidates(candidates)
    }

    /// Order the candidates and index them by ID.
    pub fn from_candidates(mut candidates: Vec<Candidate>) -> std::result::Result<Self, String> {
        candidates.sort_by(|a, b| {
            b.is_volunteer
                .cmp(&a.is_volunteer)
                .then_with(|| a.label.cmp(&b.label))
        });

        let mut index = HashMap::with_capacity(candidates.len());
        for (pos, candidate) in candidates.iter().enumerate() {
            if index.insert(candidate.id.clone(), pos).is_some() {
                return Err(format!("duplicate candidate ID '{}'", candidate.id));
            }
        }

        Ok(Self {
            candidates,
            index,
            fingerprint: String::new(),
        })
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// SHA-256 of the source file, hex encoded. Empty for in-memory rosters.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn get(&self, id: &CandidateId) -> Option<&Candidate> {
        self.index.get(id).map(|&pos| &self.candidates[pos])
    }

    pub fn contains(&self, id: &CandidateId) -> bool {
        self.index.contains_key(id)
    }

    /// Sorted distinct non-empty divisions.
    pub fn divisions(&self) -> Vec<&str> {
        self.candidates
            .iter()
            .map(|c| c.division.as_str())
            .filter(|d| !d.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Candidates visible under `filter`, in roster order.
    pub fn filter<'a>(&'a self, filter: &'a RosterFilter) -> impl Iterator<Item = &'a Candidate> {
        self.candidates.iter().filter(move |c| filter.matches(c))
    }
}

/// The ballot screen's search box, division selector and volunteer toggle.
#[derive(Debug, Clone, Default, PartialEq, Eq, FromForm)]
pub struct RosterFilter {
    pub search: Option<String>,
    pub division: Option<String>,
    #[field(name = "volunteers")]
    #[field(default = false)]
    pub volunteers_only: bool,
}

impl RosterFilter {
    pub fn matches(&self, candidate: &Candidate) -> bool {
        if let Some(search) = self.search.as_deref().map(str::trim) {
            if !search.is_empty()
                && !candidate
                    .label
                    .to_lowercase()
                    .contains(&search.to_lowercase())
            {
                return false;
            }
        }
        if let Some(division) = self.division.as_deref() {
            if !division.is_empty() && division != ALL_DIVISIONS && candidate.division != division
            {
                return false;
            }
        }
        !self.volunteers_only || candidate.is_volunteer
    }
}
