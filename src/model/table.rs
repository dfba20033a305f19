//! A header-plus-rows view of a tabular source, with alias-based column
//! lookup.

use std::io::Read;
use std::path::Path;

use calamine::{open_workbook_auto, DataType, Reader};

use crate::error::{Error, Result};

use super::text::fold;

/// Index of a resolved column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column(usize);

/// A table of string cells. Every row is padded or truncated to the header
/// width on access, so ragged sources are tolerated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Read a table from the file at `path`, choosing the format by extension.
    /// Anything that is not `.csv` is treated as a workbook and its first
    /// worksheet is used.
    pub fn load(path: &Path) -> Result<Self> {
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if is_csv {
            let file = std::fs::File::open(path)
                .map_err(|e| Error::config_load(path.display(), e))?;
            Self::from_csv(file).map_err(|e| Error::config_load(path.display(), e))
        } else {
            Self::from_workbook(path)
        }
    }

    /// Read a CSV table whose first record is the header.
    pub fn from_csv<R: Read>(reader: R) -> std::result::Result<Self, csv::Error> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::None)
            .from_reader(reader);
        let headers = rdr.headers()?.iter().map(str::to_string).collect();
        let rows = rdr
            .records()
            .map(|record| record.map(|r| r.iter().map(str::to_string).collect()))
            .collect::<std::result::Result<Vec<Vec<String>>, _>>()?;
        Ok(Self { headers, rows })
    }

    /// Read the first worksheet of a spreadsheet workbook.
    pub fn from_workbook(path: &Path) -> Result<Self> {
        let mut workbook =
            open_workbook_auto(path).map_err(|e| Error::config_load(path.display(), e))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| Error::config_load(path.display(), "workbook has no worksheets"))?
            .map_err(|e| Error::config_load(path.display(), e))?;

        let mut rows = range.rows();
        let headers = rows
            .next()
            .ok_or_else(|| Error::config_load(path.display(), "worksheet is empty"))?
            .iter()
            .map(cell_to_string)
            .collect();
        let rows = rows
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect();
        Ok(Self { headers, rows })
    }

    /// Find the first header matching any of `aliases`, trying aliases in
    /// order. Matching ignores case, accents and whitespace runs.
    pub fn column(&self, aliases: &[&str]) -> Option<Column> {
        let folded = self.headers.iter().map(|h| fold(h)).collect::<Vec<_>>();
        aliases.iter().find_map(|alias| {
            let alias = fold(alias);
            folded.iter().position(|h| *h == alias).map(Column)
        })
    }

    /// Iterate over rows as [`Row`] accessors.
    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(|cells| Row { cells })
    }
}

/// A borrowed table row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    cells: &'a [String],
}

impl<'a> Row<'a> {
    /// The trimmed cell in `column`, or `""` if the row is too short.
    pub fn get(&self, column: Column) -> &'a str {
        self.cells.get(column.0).map(|s| s.trim()).unwrap_or("")
    }

    /// Like [`Row::get`] but tolerates an unresolved column.
    pub fn get_opt(&self, column: Option<Column>) -> &'a str {
        column.map(|c| self.get(c)).unwrap_or("")
    }
}

/// Render a workbook cell the way a spreadsheet user would read it.
fn cell_to_string(cell: &DataType) -> String {
    match cell {
        DataType::Empty => String::new(),
        DataType::String(s) => s.clone(),
        DataType::Int(i) => i.to_string(),
        DataType::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        DataType::Float(f) => f.to_string(),
        DataType::Bool(b) => b.to_string(),
        other => format!("{other}"),
    }
}
