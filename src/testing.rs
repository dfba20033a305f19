//! Seeded data files for route tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use crate::model::{
    ballot::LedgerRecord,
    storage::spreadsheet::{TokenSheet, VoteSheet},
    token::AccessToken,
};

const CANDIDATES: &str = "\
NOMBRES A UTILIZAR PARA VOTAR,RUN (sin puntos),DV,Dependencia/División,Voluntario
Jane Doe,11.111.111,1,Finance,Sí
John Roe,22222222,2,Legal,no
Ana Pérez,33333333,3,Legal,
,44444444,4,Finance,
Bruno Díaz,55555555,5,Operations,x
Carla Soto,66666666,6,Finance,
Diego Rojas,77777777,7,Legal,
Elena Vidal,88888888,8,Operations,
Felipe Mora,99999999,9,Finance,
";

const TOKENS: &str = "\
token,correo,Usado,FechaUso
AB1234,jane@example.org,,
CD5678,,,
EF9012,,True,2024-05-01T10:00:00+00:00
";

/// A temporary directory holding a roster, a token file and (once a ballot
/// is cast) a vote file.
#[derive(Clone)]
pub struct DataDir(Arc<TempDir>);

impl DataDir {
    pub fn seeded() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("CANDIDATOS.csv"), CANDIDATES).unwrap();
        fs::write(dir.path().join("TOKEN.csv"), TOKENS).unwrap();
        Self(Arc::new(dir))
    }

    pub fn path(&self) -> &Path {
        self.0.path()
    }

    pub fn candidates_path(&self) -> PathBuf {
        self.path().join("CANDIDATOS.csv")
    }

    pub fn tokens_path(&self) -> PathBuf {
        self.path().join("TOKEN.csv")
    }

    pub fn votes_path(&self) -> PathBuf {
        self.path().join("VOTOS.csv")
    }

    /// The token record for `code` as currently on disk.
    pub fn token(&self, code: &str) -> Option<AccessToken> {
        TokenSheet::open(self.tokens_path())
            .unwrap()
            .read()
            .unwrap()
            .into_iter()
            .find(|t| t.token.as_str() == code)
    }

    /// Every recorded vote.
    pub fn votes(&self) -> Vec<LedgerRecord> {
        VoteSheet::new(self.votes_path()).records().unwrap()
    }

    /// Remove the directory now rather than when the last handle drops.
    pub fn remove(self) {
        let _ = fs::remove_dir_all(self.path());
    }
}
