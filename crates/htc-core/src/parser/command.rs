//! Command sub-grammars: `expect` and `tx`
//!
//! Commands form a closed set keyed on their leading keyword. Each variant
//! owns its grammar; `tx` builds a response inside `handle` stanzas and a
//! request inside `client` stanzas.

use regex::Regex;

use super::ast::*;
use super::tokenizer::{SpannedToken, Token, Tokenizer};
use crate::{Error, Result};

/// Which stanza a command appears in; decides what `tx` produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StanzaKind {
    Handler,
    Client,
}

/// A parsed command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Expect(Expect),
    Tx(Tx),
}

/// Result of a `tx` command, shaped by the enclosing stanza
#[derive(Debug, Clone, PartialEq)]
pub enum Tx {
    Response(ResponseSpec),
    Request(RequestSpec),
}

impl Command {
    /// Parse the command introduced by `keyword`.
    ///
    /// Returns `None` if `keyword` does not start a command.
    pub fn parse(
        keyword: &SpannedToken,
        stanza: StanzaKind,
        tokens: &mut Tokenizer,
    ) -> Result<Option<Command>> {
        let command = match keyword.token {
            Token::Expect => Command::Expect(parse_expect(keyword, tokens)?),
            Token::Tx => match stanza {
                StanzaKind::Handler => Command::Tx(Tx::Response(parse_response(tokens)?)),
                StanzaKind::Client => Command::Tx(Tx::Request(parse_request(tokens)?)),
            },
            _ => return Ok(None),
        };
        Ok(Some(command))
    }
}

// ── expect ────────────────────────────────────────────────

fn expect_error(message: impl std::fmt::Display, got: &SpannedToken) -> Error {
    Error::syntax(
        format!("Parse error in 'expect' command: {}, got {}", message, got.token),
        &got.span,
    )
}

/// `("req"|"resp") "." field ("eq"|"ne"|"~") (STRING|INTEGER)`
pub fn parse_expect(keyword: &SpannedToken, tokens: &mut Tokenizer) -> Result<Expect> {
    let token = tokens.next_significant();
    let side = match token.token {
        Token::Req => Side::Request,
        Token::Resp => Side::Response,
        _ => return Err(expect_error("expecting {req,resp}", &token)),
    };
    let mut verbatim = token.token.text();

    let token = tokens.next_significant();
    if token.token != Token::Dot {
        return Err(expect_error("expecting something like 'req.method'", &token));
    }
    verbatim.push('.');

    let token = tokens.next_significant();
    let field = match token.token {
        Token::Method => Field::Method,
        Token::Status => Field::Status,
        Token::Body => Field::Body,
        Token::Headers => Field::Header(parse_header_name(tokens)?),
        _ => {
            return Err(expect_error(
                "expecting '{method,status,headers,body}'",
                &token,
            ))
        }
    };
    verbatim.push_str(&token.token.text());
    if let Field::Header(name) = &field {
        verbatim.push_str(&format!("[{:?}]", name));
    }

    let op_token = tokens.next_significant();
    if !matches!(op_token.token, Token::Eq | Token::Ne | Token::Tilde) {
        return Err(expect_error("expecting operator to be '{eq,ne,~}'", &op_token));
    }
    verbatim.push(' ');
    verbatim.push_str(&op_token.token.text());

    let token = tokens.next_significant();
    let expected = match &token.token {
        Token::StringLiteral(s) => {
            verbatim.push_str(&format!(" {:?}", s));
            s.clone()
        }
        Token::IntegerLiteral(digits) => {
            verbatim.push(' ');
            verbatim.push_str(digits);
            digits.clone()
        }
        _ => return Err(expect_error("expecting a string/integer", &token)),
    };

    let operator = match op_token.token {
        Token::Eq => Operator::Equal,
        Token::Ne => Operator::NotEqual,
        _ => {
            let regex = Regex::new(&expected).map_err(|e| {
                Error::syntax(
                    format!(
                        "Parse error in 'expect' command: invalid regular expression {:?}: {}",
                        expected, e
                    ),
                    &token.span,
                )
            })?;
            Operator::Matches(Pattern(regex))
        }
    };

    log::debug!("parsed expect {:?} at {}", verbatim, keyword.span);

    Ok(Expect {
        side,
        field,
        operator,
        expected,
        verbatim,
        span: keyword.span.clone(),
    })
}

/// `"[" STRING "]"` after `headers`
fn parse_header_name(tokens: &mut Tokenizer) -> Result<String> {
    const SHAPE: &str = "expecting 'req.headers[$hdr_name]'";

    let token = tokens.next_significant();
    if token.token != Token::LBracket {
        return Err(expect_error(SHAPE, &token));
    }
    let token = tokens.next_significant();
    let name = match &token.token {
        Token::StringLiteral(name) => name.clone(),
        _ => return Err(expect_error(SHAPE, &token)),
    };
    let token = tokens.next_significant();
    if token.token != Token::RBracket {
        return Err(expect_error(SHAPE, &token));
    }
    Ok(name)
}

// ── tx ────────────────────────────────────────────────────

fn tx_error(message: impl std::fmt::Display, got: &SpannedToken) -> Error {
    Error::syntax(
        format!("Parse error in 'tx' command: {}, got {}", message, got.token),
        &got.span,
    )
}

/// Read the next flag of a `tx` line. `None` at end of statement; the
/// terminator is pushed back for the caller.
fn next_flag(tokens: &mut Tokenizer) -> Option<SpannedToken> {
    let token = tokens.next_in_statement();
    match token.token {
        Token::Eof | Token::RBrace | Token::Newline => {
            tokens.unread(token);
            None
        }
        _ => Some(token),
    }
}

fn string_arg(tokens: &mut Tokenizer) -> Result<String> {
    let token = tokens.next_significant();
    match &token.token {
        Token::StringLiteral(s) => Ok(s.clone()),
        _ => Err(tx_error("expecting a string", &token)),
    }
}

/// `"Name: Value"`, split on the first colon only
fn header_arg(tokens: &mut Tokenizer) -> Result<(String, String)> {
    let token = tokens.next_significant();
    let raw = match &token.token {
        Token::StringLiteral(s) => s,
        _ => return Err(tx_error("expecting a string", &token)),
    };
    let (name, value) = match raw.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => (name.trim(), value.trim()),
        _ => return Err(tx_error("expecting a header", &token)),
    };
    if http::HeaderName::from_bytes(name.as_bytes()).is_err() {
        return Err(tx_error(format!("invalid header name {:?}", name), &token));
    }
    if http::HeaderValue::from_str(value).is_err() {
        return Err(tx_error(format!("invalid value for header {:?}", name), &token));
    }
    Ok((name.to_string(), value.to_string()))
}

fn status_arg(tokens: &mut Tokenizer) -> Result<u16> {
    let token = tokens.next_significant();
    match &token.token {
        Token::IntegerLiteral(digits) => digits
            .parse::<u16>()
            .map_err(|_| tx_error("expecting a status code", &token)),
        _ => Err(tx_error("expecting an integer", &token)),
    }
}

/// `tx` in a handler: `-body STRING`, `-header STRING`, `-status INTEGER`
pub fn parse_response(tokens: &mut Tokenizer) -> Result<ResponseSpec> {
    let mut response = ResponseSpec::default();

    while let Some(flag) = next_flag(tokens) {
        match flag.token {
            Token::BodyFlag => response.body = string_arg(tokens)?,
            Token::HeaderFlag => {
                let (name, value) = header_arg(tokens)?;
                response.headers.insert(name, value);
            }
            Token::StatusFlag => response.status = status_arg(tokens)?,
            _ => {
                return Err(tx_error(
                    "expecting -body, -header, or -status",
                    &flag,
                ))
            }
        }
    }

    Ok(response)
}

/// `tx` in a client: `-url STRING`, `-method STRING`, `-header STRING`, `-body STRING`
pub fn parse_request(tokens: &mut Tokenizer) -> Result<RequestSpec> {
    let mut request = RequestSpec::default();

    while let Some(flag) = next_flag(tokens) {
        match flag.token {
            Token::UrlFlag => request.uri = string_arg(tokens)?,
            Token::MethodFlag => request.method = string_arg(tokens)?,
            Token::BodyFlag => request.body = string_arg(tokens)?,
            Token::HeaderFlag => {
                let (name, value) = header_arg(tokens)?;
                request.headers.insert(name, value);
            }
            _ => {
                return Err(tx_error(
                    "expecting -url, -header, -method, or -body",
                    &flag,
                ))
            }
        }
    }

    Ok(request)
}
