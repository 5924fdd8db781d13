//! Export discovery
//!
//! A best-effort textual scan for exported identifiers. It is not a parser:
//! only modern export syntax is recognized, and sources that assign to
//! `module.exports` yield an incomplete record.

use indexmap::IndexSet;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

use quiver_common::{Error, Result};

use crate::module::DEFAULT_EXPORT;

static DEFAULT_EXPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bexport\s+default\b").expect("valid regex"));

static INLINE_EXPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"\bexport\s+(?:async\s+)?",
        r"(?:function\s*\*?\s*|(?:abstract\s+)?class\s+|const\s+enum\s+|enum\s+|",
        r"const\s+|let\s+|var\s+)",
        r"([A-Za-z_$][\w$]*)",
    ))
    .expect("valid regex")
});

static GROUP_EXPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bexport\s*\{([^}]*)\}").expect("valid regex")
});

static TRAILING_IDENTIFIER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z_$][\w$]*)\s*$").expect("valid regex")
});

/// Exported names of one file, de-duplicated, in discovery order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ExportRecord {
    names: IndexSet<String>,
}

impl ExportRecord {
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn has_default(&self) -> bool {
        self.contains(DEFAULT_EXPORT)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.names.iter().cloned().collect()
    }

    fn add(&mut self, name: &str) {
        if !name.is_empty() {
            self.names.insert(name.to_string());
        }
    }
}

impl<S: Into<String>> FromIterator<S> for ExportRecord {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Read `path` and scan it for exported names
pub async fn discover_exports(path: &Path) -> Result<ExportRecord> {
    let source = tokio::fs::read_to_string(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::not_found("module", path),
        _ => Error::Io(e),
    })?;

    let record = scan_exports(&source);
    debug!("{} exports {:?}", path.display(), record.to_vec());
    Ok(record)
}

/// Scan source text for exported names
pub fn scan_exports(source: &str) -> ExportRecord {
    let code = strip_comments(source);
    let mut record = ExportRecord::default();

    if DEFAULT_EXPORT_RE.is_match(&code) {
        record.add(DEFAULT_EXPORT);
    }

    for caps in INLINE_EXPORT_RE.captures_iter(&code) {
        if let Some(name) = caps.get(1) {
            record.add(name.as_str());
        }
    }

    for caps in GROUP_EXPORT_RE.captures_iter(&code) {
        let Some(group) = caps.get(1) else {
            continue;
        };
        for declaration in group.as_str().split(',') {
            if let Some(name) = TRAILING_IDENTIFIER_RE
                .captures(declaration.trim())
                .and_then(|c| c.get(1))
            {
                record.add(name.as_str());
            }
        }
    }

    record
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Lexeme {
    Code,
    Quoted(char),
    LineComment,
    BlockComment,
}

/// Remove line and block comments. Text inside string and template
/// literals is kept verbatim.
pub fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut state = Lexeme::Code;
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            Lexeme::Code => match c {
                '/' if chars.peek() == Some(&'/') => {
                    chars.next();
                    state = Lexeme::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    state = Lexeme::BlockComment;
                }
                '"' | '\'' | '`' => {
                    out.push(c);
                    state = Lexeme::Quoted(c);
                }
                _ => out.push(c),
            },
            Lexeme::Quoted(quote) => {
                out.push(c);
                if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                } else if c == quote || (c == '\n' && quote != '`') {
                    state = Lexeme::Code;
                }
            }
            Lexeme::LineComment => {
                if c == '\n' {
                    out.push(c);
                    state = Lexeme::Code;
                }
            }
            Lexeme::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    out.push(' ');
                    state = Lexeme::Code;
                }
            }
        }
    }

    out
}
