//! Token and vote storage in local CSV files.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rocket::tokio::{sync::Mutex, task};

use crate::error::{Error, Result};
use crate::model::{
    ballot::{Ballot, LedgerRecord},
    table::Table,
    text::is_used_marker,
    token::{format_timestamp, parse_timestamp, AccessToken, TokenCode},
};

use super::{TokenStore, VoteLedger};

const TOKEN_COLUMNS: &[&str] = &[
    "TOKEN",
    "token",
    "Token",
    "código",
    "codigo",
    "Código de acceso",
    "Codigo de acceso",
];
const USED_COLUMNS: &[&str] = &["Usado", "usado", "USED"];
const USED_AT_COLUMNS: &[&str] = &["FechaUso", "FechaU", "fechauso", "fecha u", "fecha u."];
const EMAIL_COLUMNS: &[&str] = &[
    "Correo electrónico institucional",
    "Correo electronico institucional",
    "correo",
];

/// Header written when the token file is saved.
const TOKEN_HEADER: [&str; 4] = ["token", "correo", "Usado", "FechaUso"];

/// The token file. Every call re-reads the file; nothing is cached.
pub struct TokenSheet {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TokenSheet {
    /// Open the token file, checking that it is readable and has a token
    /// column.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let sheet = Self {
            path: path.into(),
            lock: Mutex::new(()),
        };
        let tokens = sheet.read()?;
        info!(
            "Loaded {} access codes from {} ({} already used)",
            tokens.len(),
            sheet.path.display(),
            tokens.iter().filter(|t| t.used).count()
        );
        Ok(sheet)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every token record.
    pub fn read(&self) -> Result<Vec<AccessToken>> {
        read_tokens(&self.path)
    }
}

/// Run file I/O on the blocking thread pool.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::Other, e)))?
}

fn read_tokens(path: &Path) -> Result<Vec<AccessToken>> {
    let file = File::open(path).map_err(|e| Error::config_load(path.display(), e))?;
    let table = Table::from_csv(file).map_err(|e| Error::config_load(path.display(), e))?;

    let token_col = table.column(TOKEN_COLUMNS).ok_or_else(|| {
        Error::config_load(path.display(), "no access code column (e.g. 'token')")
    })?;
    let used_col = table.column(USED_COLUMNS);
    let used_at_col = table.column(USED_AT_COLUMNS);
    let email_col = table.column(EMAIL_COLUMNS);

    let tokens = table
        .rows()
        .filter_map(|row| {
            let token = TokenCode::normalize(row.get(token_col));
            if token.is_empty() {
                return None;
            }
            let used = is_used_marker(row.get_opt(used_col));
            let used_at = if used {
                parse_timestamp(row.get_opt(used_at_col))
            } else {
                None
            };
            let email = Some(row.get_opt(email_col).to_lowercase()).filter(|e| !e.is_empty());
            Some(AccessToken {
                token,
                used,
                used_at,
                email,
            })
        })
        .collect();
    Ok(tokens)
}

/// Replace the token file atomically: write a sibling temp file, sync it,
/// then rename over the original.
fn write_tokens(path: &Path, tokens: &[AccessToken]) -> Result<()> {
    let tmp_path = path.with_extension("csv.tmp");
    let mut writer = csv::Writer::from_path(&tmp_path)?;
    writer.write_record(TOKEN_HEADER)?;
    for token in tokens {
        let used_at = token.used_at.map(format_timestamp).unwrap_or_default();
        writer.write_record([
            token.token.as_str(),
            token.email.as_deref().unwrap_or(""),
            if token.used { "True" } else { "" },
            used_at.as_str(),
        ])?;
    }
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[rocket::async_trait]
impl TokenStore for TokenSheet {
    async fn lookup(&self, token: &TokenCode) -> Result<Option<AccessToken>> {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        let tokens = blocking(move || read_tokens(&path)).await?;
        Ok(tokens.into_iter().find(|t| t.token == *token))
    }

    async fn mark_used(&self, token: &TokenCode, at: DateTime<Utc>) -> Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        let token = token.clone();
        blocking(move || {
            let mut tokens = read_tokens(&path)?;
            let record = tokens
                .iter_mut()
                .find(|t| t.token == token)
                .ok_or_else(|| Error::TokenNotFound(token.to_string()))?;
            if !record.consume(at) {
                return Err(Error::TokenAlreadyUsed);
            }
            write_tokens(&path, &tokens)
        })
        .await
    }
}

/// The vote file, appended one row per ballot.
pub struct VoteSheet {
    path: PathBuf,
    lock: Mutex<()>,
}

impl VoteSheet {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back every recorded row.
    pub fn records(&self) -> Result<Vec<LedgerRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&self.path)?;
        let records = reader
            .deserialize()
            .collect::<std::result::Result<Vec<LedgerRecord>, csv::Error>>()?;
        Ok(records)
    }
}

#[rocket::async_trait]
impl VoteLedger for VoteSheet {
    async fn append(&self, ballot: &Ballot) -> Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        let record = ballot.to_record();
        blocking(move || append_record(&path, &record)).await
    }
}

/// Append one row, writing the header first if the file is new or empty.
fn append_record(path: &Path, record: &LedgerRecord) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let is_new = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(is_new)
        .from_writer(&mut file);
    writer.serialize(record)?;
    writer.flush()?;
    drop(writer);

    file.flush()?;
    file.sync_all()?;
    Ok(())
}
