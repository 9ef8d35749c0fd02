//! Program verifier: static checks run before any traffic is sent
//!
//! The parser only checks shape. The verifier looks at a whole `Program`
//! and reports problems that would otherwise surface mid-run, such as an
//! assertion on a field the inspected message does not have. It
//! accumulates all diagnostics rather than stopping at the first one.
//!
//! # Checks
//!
//! 1. **Fields**: `status` only exists on responses, `method` only on requests
//! 2. **Sides**: handlers inspect requests, clients inspect responses
//! 3. **Routing**: one handler per URI path
//! 4. **Clients**: every client sends something and checks something

use std::collections::BTreeSet;
use std::fmt;

use crate::parser::ast::*;
use crate::parser::tokenizer::Span;

// ── Verification Result Types ─────────────────────────────

/// Result of program verification: accumulates all diagnostics
#[derive(Debug, Clone, Default)]
pub struct VerificationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl VerificationResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no errors were found (warnings are OK)
    pub fn is_valid(&self) -> bool {
        !self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn errors(&self) -> Vec<&Diagnostic> {
        self.with_severity(Severity::Error)
    }

    pub fn warnings(&self) -> Vec<&Diagnostic> {
        self.with_severity(Severity::Warning)
    }

    /// Turn the result into an error if verification failed
    pub fn into_result(self) -> crate::Result<Vec<Diagnostic>> {
        if self.is_valid() {
            return Ok(self.diagnostics);
        }
        let messages: Vec<String> = self.errors().iter().map(|d| d.to_string()).collect();
        Err(crate::Error::Verification(messages.join("; ")))
    }

    fn with_severity(&self, severity: Severity) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .collect()
    }

    fn add_error(&mut self, kind: DiagnosticKind, message: String, span: &Span) {
        self.push(Severity::Error, kind, message, span);
    }

    fn add_warning(&mut self, kind: DiagnosticKind, message: String, span: &Span) {
        self.push(Severity::Warning, kind, message, span);
    }

    fn push(&mut self, severity: Severity, kind: DiagnosticKind, message: String, span: &Span) {
        self.diagnostics.push(Diagnostic {
            severity,
            kind,
            message,
            span: span.clone(),
        });
    }
}

/// A single verification diagnostic
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: Span,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{} [{}] at {}: {}", prefix, self.kind, self.span, self.message)
    }
}

/// Severity level for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Severity {
    Error,
    Warning,
}

/// Category of verification issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum DiagnosticKind {
    Field,
    Side,
    Routing,
    Client,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DiagnosticKind::Field => write!(f, "field"),
            DiagnosticKind::Side => write!(f, "side"),
            DiagnosticKind::Routing => write!(f, "routing"),
            DiagnosticKind::Client => write!(f, "client"),
        }
    }
}

// ── Public API ────────────────────────────────────────────

/// Verify a parsed program.
///
/// Runs every check and returns the accumulated diagnostics.
pub fn verify(program: &Program) -> VerificationResult {
    let mut result = VerificationResult::new();

    for handler in &program.handlers {
        for exp in &handler.expectations {
            verify_field(exp, Side::Request, &mut result);
            verify_side(exp, Side::Request, "handle", &mut result);
        }
    }
    for client in &program.clients {
        for exp in &client.expectations {
            verify_field(exp, Side::Response, &mut result);
            verify_side(exp, Side::Response, "client", &mut result);
        }
        verify_client(client, &mut result);
    }
    verify_unique_paths(program, &mut result);

    result
}

// ── Checks ────────────────────────────────────────────────

/// `inspected` is the message the stanza evaluates against, whatever side
/// the assertion names
fn verify_field(exp: &Expect, inspected: Side, result: &mut VerificationResult) {
    match (inspected, &exp.field) {
        (Side::Request, Field::Status) => result.add_error(
            DiagnosticKind::Field,
            format!("requests have no status: {}", exp),
            &exp.span,
        ),
        (Side::Response, Field::Method) => result.add_error(
            DiagnosticKind::Field,
            format!("responses have no method: {}", exp),
            &exp.span,
        ),
        _ => {}
    }
}

/// An assertion's side should name the message its stanza actually inspects
fn verify_side(exp: &Expect, inspected: Side, stanza: &str, result: &mut VerificationResult) {
    if exp.side == inspected {
        return;
    }
    let inspected_name = match inspected {
        Side::Request => "inbound request",
        Side::Response => "received response",
    };
    result.add_warning(
        DiagnosticKind::Side,
        format!(
            "{} in a '{}' stanza is evaluated against the {}",
            exp, stanza, inspected_name
        ),
        &exp.span,
    );
}

fn verify_unique_paths(program: &Program, result: &mut VerificationResult) {
    let mut seen = BTreeSet::new();
    for handler in &program.handlers {
        if !seen.insert(handler.uri_path.as_str()) {
            result.add_error(
                DiagnosticKind::Routing,
                format!("duplicate handler for URI path '{}'", handler.uri_path),
                &handler.span,
            );
        }
    }
}

fn verify_client(client: &ClientStanza, result: &mut VerificationResult) {
    match &client.request {
        None => result.add_warning(
            DiagnosticKind::Client,
            format!("client '{}' has no 'tx' command, sending GET with an empty URL", client.name),
            &client.span,
        ),
        Some(request) if !request.uri.starts_with('/') => result.add_warning(
            DiagnosticKind::Client,
            format!(
                "client '{}' sends to URL '{}', which does not start with '/'",
                client.name, request.uri
            ),
            &client.span,
        ),
        Some(_) => {}
    }

    if client.expectations.is_empty() {
        result.add_warning(
            DiagnosticKind::Client,
            format!("client '{}' has no 'expect' command", client.name),
            &client.span,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;

    fn parse_and_verify(input: &str) -> VerificationResult {
        let program = parse(input).expect("test input should parse");
        verify(&program)
    }

    #[test]
    fn test_valid_fixtures() {
        for input in [
            include_str!("../../../tests/fixtures/valid/basic-get.htc"),
            include_str!("../../../tests/fixtures/valid/post-echo.htc"),
        ] {
            let result = parse_and_verify(input);
            assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
        }
    }

    #[test]
    fn test_status_on_request_is_error() {
        let result = parse_and_verify(include_str!(
            "../../../tests/fixtures/invalid/status-on-request.htc"
        ));
        assert!(!result.is_valid());
        let errors = result.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, DiagnosticKind::Field);
        assert_eq!(errors[0].span.line, 2);
    }

    #[test]
    fn test_method_on_response_is_error() {
        let result = parse_and_verify(
            "client \"c\" {\n  tx -url \"/\"\n  expect resp.method eq \"GET\"\n}",
        );
        assert_eq!(result.errors().len(), 1);
        assert!(result.errors()[0].message.contains("responses have no method"));
    }

    #[test]
    fn test_field_checked_against_inspected_message() {
        let result = parse_and_verify("handle \"/p\" {\n  expect resp.status eq 200\n}");
        let errors = result.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("requests have no status"));
        assert_eq!(result.warnings().len(), 1);

        let result = parse_and_verify(
            "client \"c\" {\n  tx -url \"/p\"\n  expect req.method eq \"GET\"\n}",
        );
        let errors = result.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("responses have no method"));
        assert_eq!(errors[0].span.line, 3);
    }

    #[test]
    fn test_side_mismatch_is_warning() {
        let result = parse_and_verify("handle \"/p\" {\n  expect resp.body eq \"\"\n}");
        assert!(result.is_valid());
        let warnings = result.warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, DiagnosticKind::Side);
        assert!(warnings[0].message.contains("inbound request"));
    }

    #[test]
    fn test_duplicate_handler_paths() {
        let result = parse_and_verify("handle \"/a\" { }\nhandle \"/b\" { }\nhandle \"/a\" { }");
        let errors = result.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, DiagnosticKind::Routing);
        assert_eq!(errors[0].span.line, 3);
    }

    #[test]
    fn test_client_without_tx_or_expect() {
        let result = parse_and_verify("client \"idle\" { }");
        assert!(result.is_valid());
        assert_eq!(result.warnings().len(), 2);
    }

    #[test]
    fn test_client_url_without_slash() {
        let result = parse_and_verify(
            "client \"c\" {\n  tx -url \"endpoint\"\n  expect resp.status eq 200\n}",
        );
        let warnings = result.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("does not start with '/'"));
    }

    #[test]
    fn test_into_result() {
        let ok = parse_and_verify("client \"idle\" { }").into_result().unwrap();
        assert_eq!(ok.len(), 2);

        let err = parse_and_verify("handle \"/p\" { expect req.status eq 200 }")
            .into_result()
            .unwrap_err();
        assert!(matches!(err, crate::Error::Verification(_)));
    }

    #[test]
    fn test_diagnostic_display() {
        let result = parse_and_verify("handle \"/p\" { expect req.status eq 200 }");
        assert_eq!(
            result.errors()[0].to_string(),
            "error [field] at 1:15: requests have no status: \"req.status eq 200\""
        );
    }

    #[test]
    fn test_verification_determinism_100_iterations() {
        let input = "handle \"/a\" { expect resp.status eq 1 }\nhandle \"/a\" { }\nclient \"c\" { }";
        let first = parse_and_verify(input).diagnostics;
        for i in 0..100 {
            let result = parse_and_verify(input).diagnostics;
            assert_eq!(first, result, "Determinism failure at iteration {}", i);
        }
    }
}
