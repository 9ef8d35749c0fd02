//! HTC AST Types: the executable representation of a script
//!
//! A `Program` is built once by the parser and is read-only afterwards.
//! All types derive `Serialize` so tooling can dump a parsed script.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::{Serialize, Serializer};

use super::tokenizer::Span;

/// A parsed script: every stanza in source order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Program {
    pub handlers: Vec<HandlerStanza>,
    pub clients: Vec<ClientStanza>,
}

/// `handle "<path>" { ... }`: origin-side mock behaviour
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandlerStanza {
    pub uri_path: String,
    /// Checked against the inbound request
    pub expectations: Vec<Expect>,
    pub response: ResponseSpec,
    pub span: Span,
}

/// `client "<name>" { ... }`: drives one outbound request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientStanza {
    pub name: String,
    /// `None` until the stanza's `tx` is seen
    pub request: Option<RequestSpec>,
    /// Checked against the response received
    pub expectations: Vec<Expect>,
    pub span: Span,
}

impl ClientStanza {
    /// The request to send, falling back to the defaults when no `tx` was given
    pub fn request_or_default(&self) -> RequestSpec {
        self.request.clone().unwrap_or_default()
    }
}

// ── expect ────────────────────────────────────────────────

/// Which message an assertion talks about (`req` / `resp`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Side {
    Request,
    Response,
}

/// The part of a message an assertion inspects
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Field {
    Method,
    Status,
    Body,
    /// Header lookup by name; the name only exists for this field
    Header(String),
}

/// Comparison applied between actual and expected values
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Operator {
    Equal,
    NotEqual,
    /// Unanchored regex search, compiled when the script is parsed
    Matches(Pattern),
}

/// A compiled regular expression that compares and serializes by its source
#[derive(Debug, Clone)]
pub struct Pattern(pub Regex);

impl Pattern {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        self.0.is_match(haystack)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// `expect <side>.<field> <op> <value>`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expect {
    pub side: Side,
    pub field: Field,
    pub operator: Operator,
    /// Always text, integer literals included
    pub expected: String,
    /// Human-readable reconstruction of the source, for diagnostics only
    pub verbatim: String,
    pub span: Span,
}

impl Expect {
    pub fn header_name(&self) -> Option<&str> {
        match &self.field {
            Field::Header(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Expect {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self.verbatim)
    }
}

// ── tx ────────────────────────────────────────────────────

/// `tx` inside a handler: the canned response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseSpec {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl Default for ResponseSpec {
    fn default() -> Self {
        ResponseSpec {
            status: 200,
            headers: BTreeMap::new(),
            body: String::new(),
        }
    }
}

impl fmt::Display for ResponseSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "HTTP {}: {:?}", self.status, self.body)
    }
}

/// `tx` inside a client: the request to send
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestSpec {
    pub method: String,
    pub uri: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl Default for RequestSpec {
    fn default() -> Self {
        RequestSpec {
            method: "GET".to_string(),
            uri: String::new(),
            headers: BTreeMap::new(),
            body: String::new(),
        }
    }
}

impl fmt::Display for RequestSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{} {}", self.method, self.uri)?;
        for (name, value) in &self.headers {
            writeln!(f, "{}: {}", name, value)?;
        }
        Ok(())
    }
}
