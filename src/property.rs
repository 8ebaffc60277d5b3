//! Property definitions and queries.
//!
//! A property *atom* is `name=value` (mandatory) or `name?value`
//! (preference). Implementations describe what they provide with a
//! *definition*, mandatory atoms only, and callers describe what they
//! require with a *query*, which may mix both kinds. A definition matches a
//! query when it satisfies every mandatory atom; satisfied preferences only
//! raise the candidate's score. See [`PropertyQuery::score`].
//!
//! Atom names fold to ASCII lowercase, as do unquoted values; quoted values
//! compare verbatim. `yes`/`no` normalize to booleans and decimal literals
//! to integers, so `fips=yes` and `FIPS=YES` are the same atom.

mod parse;

use crate::Result;
use std::fmt::{self, Display, Formatter};

/// A normalized property value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PropertyValue {
    /// `yes` / `no`.
    Bool(bool),
    /// A decimal integer.
    Int(i64),
    /// Anything else.
    Str(Box<str>),
}

impl Display for PropertyValue {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            PropertyValue::Bool(true) => f.write_str("yes"),
            PropertyValue::Bool(false) => f.write_str("no"),
            PropertyValue::Int(i) => write!(f, "{}", i),
            PropertyValue::Str(s) => f.write_str(s),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Atom {
    pub(crate) name: Box<str>,
    pub(crate) value: PropertyValue,
    pub(crate) optional: bool,
}

impl Display for Atom {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}{}{}", self.name, if self.optional { '?' } else { '=' }, self.value)
    }
}

/// What an implementation *provides*: a set of mandatory atoms attached to
/// it when its provider registered it.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PropertyDefinition {
    atoms: Vec<Atom>,
}

impl PropertyDefinition {
    /// Parses a definition string. Preference atoms (`name?value`) are a
    /// query-only construct and are rejected here.
    pub fn parse(input: &str) -> Result<Self> {
        let atoms = parse::parse_atoms(input, false)?;
        Ok(Self { atoms })
    }

    /// The value this definition provides for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        let folded = name.to_ascii_lowercase();
        self.atoms.iter().find(|a| *a.name == *folded).map(|a| &a.value)
    }

    /// Whether the definition has no atoms.
    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }
}

impl Display for PropertyDefinition {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        display_atoms(&self.atoms, f)
    }
}

/// What a caller *requires*: mandatory atoms that candidates must satisfy
/// and preference atoms that break ties between those that do.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PropertyQuery {
    atoms: Vec<Atom>,
}

impl PropertyQuery {
    /// Parses a query string.
    pub fn parse(input: &str) -> Result<Self> {
        let atoms = parse::parse_atoms(input, true)?;
        Ok(Self { atoms })
    }

    /// The empty query, which every definition matches with score zero.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether the query has no atoms.
    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// Scores `definition` against this query: `None` when any mandatory
    /// atom is unsatisfied, otherwise the count of satisfied preferences.
    pub fn score(&self, definition: &PropertyDefinition) -> Option<u32> {
        let mut score = 0;
        for atom in &self.atoms {
            let satisfied = definition
                .atoms
                .iter()
                .any(|d| d.name == atom.name && d.value == atom.value);
            if atom.optional {
                score += satisfied as u32;
            } else if !satisfied {
                return None;
            }
        }
        Some(score)
    }

    /// This query with `defaults`' atoms appended, except where this query
    /// already names the same atom.
    pub fn merge_defaults(&self, defaults: &PropertyQuery) -> PropertyQuery {
        let mut atoms = self.atoms.clone();
        for default in &defaults.atoms {
            if !atoms.iter().any(|a| a.name == default.name) {
                atoms.push(default.clone());
            }
        }
        PropertyQuery { atoms }
    }
}

impl Display for PropertyQuery {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        display_atoms(&self.atoms, f)
    }
}

fn display_atoms(atoms: &[Atom], f: &mut Formatter) -> fmt::Result {
    for (i, atom) in atoms.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{}", atom)?;
    }
    Ok(())
}
