//! Expectation evaluator: checks `expect` assertions against live messages
//!
//! The evaluator is stateless and reentrant. It works on fully buffered
//! messages (`http::Request<Bytes>` / `http::Response<Bytes>`): the network
//! layer reads each body exactly once, and every assertion then reads the
//! same buffer, so a body check never starves a later one.
//!
//! # Field extraction
//!
//! | field     | request                 | response                  |
//! |-----------|-------------------------|---------------------------|
//! | `method`  | request method          | error                     |
//! | `status`  | error                   | decimal status code       |
//! | `headers` | first value, or `""`    | first value, or `""`      |
//! | `body`    | body as text, or `""`   | body as text, or `""`     |

use std::fmt;

use bytes::Bytes;
use http::{HeaderMap, Request, Response};

use crate::{Error, Expect, Field, Operator, Result};

/// A buffered message an assertion can be evaluated against
#[derive(Debug, Clone, Copy)]
pub enum Message<'a> {
    Request(&'a Request<Bytes>),
    Response(&'a Response<Bytes>),
}

impl<'a> From<&'a Request<Bytes>> for Message<'a> {
    fn from(req: &'a Request<Bytes>) -> Self {
        Message::Request(req)
    }
}

impl<'a> From<&'a Response<Bytes>> for Message<'a> {
    fn from(resp: &'a Response<Bytes>) -> Self {
        Message::Response(resp)
    }
}

impl<'a> Message<'a> {
    fn headers(&self) -> &'a HeaderMap {
        match *self {
            Message::Request(req) => req.headers(),
            Message::Response(resp) => resp.headers(),
        }
    }

    fn body(&self) -> &'a Bytes {
        match *self {
            Message::Request(req) => req.body(),
            Message::Response(resp) => resp.body(),
        }
    }

    /// Case-insensitive header lookup; a missing header reads as `""`
    fn header(&self, name: &str) -> String {
        self.headers()
            .get(name)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .unwrap_or_default()
    }
}

/// Verdict of one assertion plus the value it was compared against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub passed: bool,
    pub actual: String,
}

/// A failed assertion, rendered the way runs report failures
#[derive(Debug, Clone, PartialEq)]
pub struct Failure<'e> {
    pub expect: &'e Expect,
    pub actual: String,
}

impl fmt::Display for Failure<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "FAILED: {} (actual={:?})", self.expect, self.actual)
    }
}

/// Extract the value `expect` talks about from `message`
///
/// # Errors
/// `Error::Evaluation` for `status` on a request or `method` on a response.
pub fn actual_value<'a>(expect: &Expect, message: impl Into<Message<'a>>) -> Result<String> {
    let message = message.into();
    let actual = match (&expect.field, message) {
        (Field::Method, Message::Request(req)) => req.method().as_str().to_string(),
        (Field::Status, Message::Response(resp)) => resp.status().as_u16().to_string(),
        (Field::Header(name), msg) => msg.header(name),
        (Field::Body, msg) => String::from_utf8_lossy(msg.body()).into_owned(),
        (Field::Status, Message::Request(_)) => {
            return Err(Error::Evaluation(format!(
                "requests have no status: {}",
                expect
            )))
        }
        (Field::Method, Message::Response(_)) => {
            return Err(Error::Evaluation(format!(
                "responses have no method: {}",
                expect
            )))
        }
    };
    Ok(actual)
}

/// Apply the operator of `expect` to an already extracted value
pub fn compare(expect: &Expect, actual: &str) -> bool {
    match &expect.operator {
        Operator::Equal => expect.expected == actual,
        Operator::NotEqual => expect.expected != actual,
        Operator::Matches(pattern) => pattern.is_match(actual),
    }
}

/// Evaluate `expect` against `message` and return the verdict
pub fn evaluate<'a>(expect: &Expect, message: impl Into<Message<'a>>) -> Result<bool> {
    Ok(check(expect, message)?.passed)
}

/// Evaluate `expect` against `message`, keeping the actual value for diagnostics
pub fn check<'a>(expect: &Expect, message: impl Into<Message<'a>>) -> Result<Outcome> {
    let actual = actual_value(expect, message)?;
    let passed = compare(expect, &actual);
    log::debug!(
        "expect {} -> {} (actual={:?})",
        expect,
        if passed { "pass" } else { "fail" },
        actual
    );
    Ok(Outcome { passed, actual })
}

/// Evaluate every assertion in order, collecting the failures.
///
/// Stops at the first evaluation error.
pub fn check_all<'e, 'a>(
    expectations: &'e [Expect],
    message: impl Into<Message<'a>>,
) -> Result<Vec<Failure<'e>>> {
    let message = message.into();
    let mut failures = Vec::new();
    for expect in expectations {
        let outcome = check(expect, message)?;
        if !outcome.passed {
            failures.push(Failure {
                expect,
                actual: outcome.actual,
            });
        }
    }
    Ok(failures)
}
