//! Table name validation using nom
//!
//! Grammar:
//! ```text
//! name := [A-Za-z_] [A-Za-z0-9_]*     (1..=64 chars, no "sqlite_" prefix)
//! ```
//!
//! A validated name is the only thing that ever reaches SQL text or a file
//! path, so the mapping name -> table -> file is a pure function of it.

use std::fmt;
use std::str::FromStr;

use nom::{
    bytes::complete::{take_while, take_while_m_n},
    combinator::{all_consuming, recognize},
    sequence::pair,
    IResult,
};

use crate::error::{Error, Result};

/// Maximum table name length
pub const MAX_NAME_LEN: usize = 64;

/// Prefix SQLite reserves for its internal tables
const RESERVED_PREFIX: &str = "sqlite_";

/// A structurally validated table name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableName(String);

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while_m_n(1, 1, |c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(input)
}

impl TableName {
    /// Parse and validate a table name
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidName {
            name: input.to_string(),
            reason,
        };

        if input.is_empty() {
            return Err(invalid("name is empty".to_string()));
        }
        if input.len() > MAX_NAME_LEN {
            return Err(invalid(format!(
                "name is {} bytes (max {})",
                input.len(),
                MAX_NAME_LEN
            )));
        }

        match all_consuming(identifier)(input) {
            Ok((_, name)) => {
                if name.to_ascii_lowercase().starts_with(RESERVED_PREFIX) {
                    return Err(invalid(format!("prefix '{}' is reserved", RESERVED_PREFIX)));
                }
                Ok(TableName(name.to_string()))
            }
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
                let offset = input.len() - e.input.len();
                let found = e.input.chars().next().unwrap_or_default();
                Err(invalid(format!(
                    "unexpected character {:?} at offset {}",
                    found, offset
                )))
            }
            Err(nom::Err::Incomplete(_)) => Err(invalid("incomplete name".to_string())),
        }
    }

    /// The raw name
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name as a double-quoted SQL identifier
    pub fn quoted(&self) -> String {
        // The grammar excludes '"', so no escaping is needed.
        format!("\"{}\"", self.0)
    }

    /// Database file holding this table
    pub fn file_name(&self) -> String {
        format!("{}.sqlite", self.0)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TableName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for TableName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TableName::parse(s)
    }
}
