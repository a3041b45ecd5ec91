//! Delegation table rules as namerd sees them

use serde::{Deserialize, Serialize};
use std::fmt;

/// DtabEntry is a single `prefix => dst` rule in the namerd dtab API
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DtabEntry {
    pub prefix: String,
    pub dst: String,
}

impl DtabEntry {
    pub fn new(prefix: impl Into<String>, dst: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            dst: dst.into(),
        }
    }
}

impl fmt::Display for DtabEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {};", self.prefix, self.dst)
    }
}

/// Render a table in dtab text form, one rule per line
pub fn render_dtab(entries: &[DtabEntry]) -> String {
    entries
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
