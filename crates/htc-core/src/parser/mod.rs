//! HTC Parser: tokenizer, AST types, and recursive descent stanza parser
//!
//! Converts HTC script text into a `Program`. Parsing stops at the first
//! error; there is no recovery and no partial result.

pub mod ast;
pub mod command;
pub mod tokenizer;

use ast::*;
use command::{Command, StanzaKind, Tx};
use tokenizer::{SpannedToken, Token, Tokenizer};

use crate::{Error, Result};

/// Parse HTC text into a `Program`
///
/// # Errors
/// Returns `Error::Syntax` with line:column for malformed constructs and
/// `Error::Structure` when the script holds no stanza at all.
///
/// # Example
/// ```
/// let program = htc_core::parse(r#"handle "/p" { tx -status 204 }"#).unwrap();
/// assert_eq!(program.handlers[0].response.status, 204);
/// ```
pub fn parse(input: &str) -> Result<Program> {
    Parser::new(input).parse_program()
}

/// Recursive descent parser over a `Tokenizer`
pub struct Parser {
    tokens: Tokenizer,
}

impl Parser {
    pub fn new(input: &str) -> Self {
        Parser {
            tokens: Tokenizer::new(input),
        }
    }

    /// `program := (handle_stanza | client_stanza)*`, at least one stanza
    pub fn parse_program(&mut self) -> Result<Program> {
        let mut handlers = Vec::new();
        let mut clients = Vec::new();

        loop {
            let token = self.tokens.next_significant();
            match token.token {
                Token::Eof => break,
                Token::Handle => handlers.push(self.parse_handler(token.span)?),
                Token::Client => clients.push(self.parse_client(token.span)?),
                Token::Illegal(_) => {
                    return Err(Error::syntax(format!("Parse error: {}", token.token), &token.span))
                }
                _ => {
                    return Err(Error::syntax(
                        format!(
                            "Parse error: expecting 'handle' or 'client' stanza, got {}",
                            token.token
                        ),
                        &token.span,
                    ))
                }
            }
        }

        if handlers.is_empty() && clients.is_empty() {
            return Err(Error::Structure(
                "Parse error: at least one of 'handle' or 'client' stanza are needed".into(),
            ));
        }

        log::debug!(
            "parsed {} handler(s) and {} client(s)",
            handlers.len(),
            clients.len()
        );

        Ok(Program { handlers, clients })
    }

    /// `handle STRING "{" expect* tx? "}"`: `tx` must be the last statement
    fn parse_handler(&mut self, span: tokenizer::Span) -> Result<HandlerStanza> {
        let token = self.tokens.next_significant();
        let uri_path = match &token.token {
            Token::StringLiteral(path) if path.starts_with('/') => path.clone(),
            _ => {
                return Err(stanza_error(
                    "handle",
                    "expecting a URI path starting with '/'",
                    &token,
                ))
            }
        };

        self.expect_open_brace("handle")?;

        let mut handler = HandlerStanza {
            uri_path,
            expectations: Vec::new(),
            response: ResponseSpec::default(),
            span,
        };

        loop {
            let token = self.tokens.next_significant();
            if token.token == Token::RBrace {
                break;
            }
            match Command::parse(&token, StanzaKind::Handler, &mut self.tokens)? {
                Some(Command::Expect(exp)) => handler.expectations.push(exp),
                Some(Command::Tx(Tx::Response(response))) => {
                    handler.response = response;
                    let token = self.tokens.next_significant();
                    if token.token != Token::RBrace {
                        return Err(stanza_error(
                            "handle",
                            "expecting '}' after 'tx' command",
                            &token,
                        ));
                    }
                    break;
                }
                Some(Command::Tx(Tx::Request(_))) | None => {
                    return Err(stanza_error(
                        "handle",
                        "expecting 'expect', 'tx' or '}'",
                        &token,
                    ))
                }
            }
        }

        Ok(handler)
    }

    /// `client STRING "{" (tx | expect)* "}"`: at most one `tx`
    fn parse_client(&mut self, span: tokenizer::Span) -> Result<ClientStanza> {
        let token = self.tokens.next_significant();
        let name = match &token.token {
            Token::StringLiteral(name) => name.clone(),
            _ => {
                return Err(stanza_error(
                    "client",
                    "expecting a name for the client",
                    &token,
                ))
            }
        };

        self.expect_open_brace("client")?;

        let mut client = ClientStanza {
            name,
            request: None,
            expectations: Vec::new(),
            span,
        };

        loop {
            let token = self.tokens.next_significant();
            if token.token == Token::RBrace {
                break;
            }
            match Command::parse(&token, StanzaKind::Client, &mut self.tokens)? {
                Some(Command::Expect(exp)) => client.expectations.push(exp),
                Some(Command::Tx(Tx::Request(request))) => {
                    if client.request.is_some() {
                        return Err(Error::syntax(
                            format!(
                                "Parse error in 'client' stanza: only one 'tx' command is allowed in client {:?}",
                                client.name
                            ),
                            &token.span,
                        ));
                    }
                    client.request = Some(request);
                }
                Some(Command::Tx(Tx::Response(_))) | None => {
                    return Err(stanza_error(
                        "client",
                        "expecting 'expect', 'tx' or '}'",
                        &token,
                    ))
                }
            }
        }

        Ok(client)
    }

    fn expect_open_brace(&mut self, stanza: &str) -> Result<()> {
        let token = self.tokens.next_significant();
        if token.token != Token::LBrace {
            return Err(stanza_error(stanza, "expecting '{'", &token));
        }
        Ok(())
    }
}

fn stanza_error(stanza: &str, message: &str, got: &SpannedToken) -> Error {
    Error::syntax(
        format!("Parse error in '{}' stanza: {}, got {}", stanza, message, got.token),
        &got.span,
    )
}
