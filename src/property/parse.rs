//! The property string scanner.
//!
//! Grammar, whitespace-insensitive, atoms separated by commas or
//! whitespace:
//!
//! ```text
//! atoms := atom ((',' | ws) atom)*
//! atom  := name (('=' | '?') value)?
//! name  := [A-Za-z0-9_.-]+
//! value := quoted | bare
//! ```
//!
//! A bare `name` is shorthand for `name=yes`. Unquoted values normalize
//! (fold, `yes`/`no`, decimal integers); quoted values are kept verbatim.

use super::{Atom, PropertyValue};
use crate::{Error, Result};

struct Scanner<'i> {
    src: &'i str,
    pos: usize,
}

impl<'i> Scanner<'i> {
    fn fail(&self, at: usize, detail: &'static str) -> Error {
        Error::MalformedProperties { input: self.src.to_owned(), at, detail }
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn done(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn skip_separators(&mut self) {
        while let Some(b) = self.peek() {
            if b == b',' || b.is_ascii_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn skip_spaces(&mut self) {
        while let Some(b) = self.peek() {
            if b != b',' && b.is_ascii_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'i str {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if pred(b) {
                self.bump();
            } else {
                break;
            }
        }
        &self.src[start..self.pos]
    }

    fn take_name(&mut self) -> Result<Box<str>> {
        let at = self.pos;
        let raw = self.take_while(is_name_byte);
        if raw.is_empty() {
            return Err(self.fail(at, "expected a property name"));
        }
        Ok(raw.to_ascii_lowercase().into())
    }

    fn take_value(&mut self) -> Result<PropertyValue> {
        let at = self.pos;
        match self.peek() {
            Some(quote @ b'"') | Some(quote @ b'\'') => {
                self.bump();
                let raw = self.take_while(|b| b != quote);
                if self.peek() != Some(quote) {
                    return Err(self.fail(at, "unterminated quoted value"));
                }
                self.bump();
                Ok(PropertyValue::Str(raw.into()))
            }
            _ => {
                let raw = self.take_while(|b| b != b',' && !b.is_ascii_whitespace());
                if raw.is_empty() {
                    return Err(self.fail(at, "expected a value"));
                }
                Ok(normalize(raw))
            }
        }
    }
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.'
}

fn normalize(raw: &str) -> PropertyValue {
    let folded = raw.to_ascii_lowercase();
    match folded.as_str() {
        "yes" => PropertyValue::Bool(true),
        "no" => PropertyValue::Bool(false),
        _ => match folded.parse::<i64>() {
            Ok(i) => PropertyValue::Int(i),
            Err(_) => PropertyValue::Str(folded.into()),
        },
    }
}

pub(super) fn parse_atoms(input: &str, allow_optional: bool) -> Result<Vec<Atom>> {
    let mut scanner = Scanner { src: input, pos: 0 };
    let mut atoms: Vec<Atom> = Vec::new();

    loop {
        scanner.skip_separators();
        if scanner.done() {
            break;
        }

        let name_at = scanner.pos;
        let name = scanner.take_name()?;
        if atoms.iter().any(|a| a.name == name) {
            return Err(scanner.fail(name_at, "duplicate property name"));
        }

        scanner.skip_spaces();
        let (optional, value) = match scanner.peek() {
            Some(op @ b'=') | Some(op @ b'?') => {
                let op_at = scanner.pos;
                if op == b'?' && !allow_optional {
                    return Err(
                        scanner.fail(op_at, "preference atoms are not allowed in definitions")
                    );
                }
                scanner.bump();
                scanner.skip_spaces();
                (op == b'?', scanner.take_value()?)
            }
            Some(b',') | None => (false, PropertyValue::Bool(true)),
            Some(_) => {
                return Err(scanner.fail(scanner.pos, "expected `=`, `?`, or a separator"));
            }
        };

        atoms.push(Atom { name, value, optional });
    }

    Ok(atoms)
}
