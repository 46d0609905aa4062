//! Database record structures and list filters.

pub mod cars;
pub mod users;

use std::str::FromStr;

use crate::db::queries::SqlIdent;

/// Sort direction for list queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortDir {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDir::Asc),
            "desc" => Ok(SortDir::Desc),
            other => Err(format!("sort_dir must be 'asc' or 'desc', got '{other}'")),
        }
    }
}

impl SqlIdent for SortDir {
    fn sql_ident(&self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }
}
