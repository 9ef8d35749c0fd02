//! HTC Tokenizer: converts HTC script text into a token stream
//!
//! Handles: keywords, flags (`-body`, `-status`, ...), quoted strings,
//! integer literals, punctuation (`.`, `[`, `]`, `{`, `}`, `~`).
//! Comments run from `#` to the end of the line.
//!
//! The tokenizer never fails. Anything it cannot classify becomes an
//! `Illegal` token and it is up to the parser to reject it in context.
//!
//! Line breaks are kept observable: a run of blanks containing `\n`, or a
//! comment together with its terminating `\n`, is a single `Newline` token.
//! `next_significant` skips them, `next_in_statement` does not, which is
//! how `tx` flag loops find the end of their line.

use std::fmt;

/// Token types for HTC syntax
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    // Special
    Illegal(String),
    Eof,
    Whitespace,
    Newline,

    // Literals
    StringLiteral(String),
    /// Source digits as written; always parses as an `i64`
    IntegerLiteral(String),

    // Punctuation
    Dot,      // .
    LBracket, // [
    RBracket, // ]
    LBrace,   // {
    RBrace,   // }

    // Comparison operators
    Eq,    // eq
    Ne,    // ne
    Tilde, // ~

    // Stanza keywords
    Handle,
    Client,

    // Command keywords
    Expect,
    Tx,

    // Message sides: req.method, resp.status, ...
    Req,
    Resp,

    // Fields
    Method,
    Status,
    Headers,
    Body,

    // tx flags
    BodyFlag,   // -body
    StatusFlag, // -status
    HeaderFlag, // -header
    MethodFlag, // -method
    UrlFlag,    // -url
}

impl Token {
    /// Literal source text of the token, as used to rebuild verbatim forms
    pub fn text(&self) -> String {
        match self {
            Token::Illegal(s) | Token::StringLiteral(s) => s.clone(),
            Token::IntegerLiteral(n) => n.clone(),
            Token::Eof => String::new(),
            Token::Whitespace => " ".to_string(),
            Token::Newline => "\n".to_string(),
            Token::Dot => ".".to_string(),
            Token::LBracket => "[".to_string(),
            Token::RBracket => "]".to_string(),
            Token::LBrace => "{".to_string(),
            Token::RBrace => "}".to_string(),
            Token::Eq => "eq".to_string(),
            Token::Ne => "ne".to_string(),
            Token::Tilde => "~".to_string(),
            Token::Handle => "handle".to_string(),
            Token::Client => "client".to_string(),
            Token::Expect => "expect".to_string(),
            Token::Tx => "tx".to_string(),
            Token::Req => "req".to_string(),
            Token::Resp => "resp".to_string(),
            Token::Method => "method".to_string(),
            Token::Status => "status".to_string(),
            Token::Headers => "headers".to_string(),
            Token::Body => "body".to_string(),
            Token::BodyFlag => "-body".to_string(),
            Token::StatusFlag => "-status".to_string(),
            Token::HeaderFlag => "-header".to_string(),
            Token::MethodFlag => "-method".to_string(),
            Token::UrlFlag => "-url".to_string(),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::Illegal(s) => write!(f, "ILLEGAL token {:?}", s),
            Token::StringLiteral(s) => write!(f, "STRING: {}", s),
            Token::IntegerLiteral(n) => write!(f, "INTEGER: {}", n),
            Token::Eof => write!(f, "EOF"),
            Token::Whitespace => write!(f, "whitespace"),
            Token::Newline => write!(f, "line break"),
            other => write!(f, "{}", other.text()),
        }
    }
}

/// Keyword table, applied after greedy identifier scanning
fn keyword(text: &str) -> Option<Token> {
    let token = match text {
        "eq" => Token::Eq,
        "ne" => Token::Ne,
        "handle" => Token::Handle,
        "client" => Token::Client,
        "expect" => Token::Expect,
        "tx" => Token::Tx,
        "req" => Token::Req,
        "resp" => Token::Resp,
        "method" => Token::Method,
        "status" => Token::Status,
        "headers" => Token::Headers,
        "body" => Token::Body,
        "-body" => Token::BodyFlag,
        "-status" => Token::StatusFlag,
        "-header" => Token::HeaderFlag,
        "-method" => Token::MethodFlag,
        "-url" => Token::UrlFlag,
        _ => return None,
    };
    Some(token)
}

/// Position in source text for error reporting
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Span {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Token with source position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

/// Tokenizer for HTC source text
pub struct Tokenizer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    pushed_back: Option<SpannedToken>,
}

impl Tokenizer {
    /// Create a new tokenizer for the given input text
    pub fn new(text: &str) -> Self {
        Tokenizer {
            input: text.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            pushed_back: None,
        }
    }

    /// Tokenize the entire input into significant tokens, ending with `Eof`
    pub fn tokenize(&mut self) -> Vec<SpannedToken> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_significant();
            let done = token.token == Token::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        tokens
    }

    /// Return the next raw token, whitespace and line breaks included.
    /// After the end of input this returns `Eof` forever.
    pub fn next_token(&mut self) -> SpannedToken {
        if let Some(token) = self.pushed_back.take() {
            return token;
        }

        let span = self.current_span();
        let ch = match self.peek() {
            Some(c) => c,
            None => {
                return SpannedToken {
                    token: Token::Eof,
                    span,
                }
            }
        };

        let token = match ch {
            c if is_whitespace(c) => self.read_whitespace(),
            c if is_ident_char(c) => self.read_identifier_or_keyword(),
            '"' => self.read_string(),
            '#' => self.read_comment(),
            '.' => self.single(Token::Dot),
            '[' => self.single(Token::LBracket),
            ']' => self.single(Token::RBracket),
            '{' => self.single(Token::LBrace),
            '}' => self.single(Token::RBrace),
            '~' => self.single(Token::Tilde),
            other => {
                self.advance();
                Token::Illegal(other.to_string())
            }
        };

        SpannedToken { token, span }
    }

    /// Return the next token that is not whitespace, a line break or a comment
    pub fn next_significant(&mut self) -> SpannedToken {
        loop {
            let token = self.next_token();
            if !matches!(token.token, Token::Whitespace | Token::Newline) {
                return token;
            }
        }
    }

    /// Like `next_significant`, but stops at line breaks so the end of a
    /// statement stays observable
    pub fn next_in_statement(&mut self) -> SpannedToken {
        loop {
            let token = self.next_token();
            if token.token != Token::Whitespace {
                return token;
            }
        }
    }

    /// Push a token back so the next read returns it again.
    /// Only one token of pushback is supported.
    pub fn unread(&mut self, token: SpannedToken) {
        debug_assert!(self.pushed_back.is_none(), "only one token of pushback");
        self.pushed_back = Some(token);
    }

    // ── Character helpers ──────────────────────────────────

    fn peek(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.input.get(self.position).copied();
        if let Some(c) = ch {
            self.position += 1;
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        ch
    }

    fn current_span(&self) -> Span {
        Span {
            line: self.line,
            column: self.column,
            offset: self.position,
        }
    }

    fn single(&mut self, token: Token) -> Token {
        self.advance();
        token
    }

    // ── Whitespace & Comments ──────────────────────────────

    fn read_whitespace(&mut self) -> Token {
        let mut saw_newline = false;
        while let Some(ch) = self.peek() {
            if !is_whitespace(ch) {
                break;
            }
            saw_newline |= ch == '\n';
            self.advance();
        }
        if saw_newline {
            Token::Newline
        } else {
            Token::Whitespace
        }
    }

    fn read_comment(&mut self) -> Token {
        while let Some(ch) = self.advance() {
            if ch == '\n' {
                return Token::Newline;
            }
        }
        Token::Eof
    }

    // ── String literals ────────────────────────────────────

    /// No escape sequences: everything up to the next `"` is taken as is.
    /// An unterminated string yields whatever was read.
    fn read_string(&mut self) -> Token {
        self.advance(); // opening "
        let mut value = String::new();
        while let Some(ch) = self.advance() {
            if ch == '"' {
                break;
            }
            value.push(ch);
        }
        Token::StringLiteral(value)
    }

    // ── Identifiers, Keywords & Integers ───────────────────

    fn read_identifier_or_keyword(&mut self) -> Token {
        let start = self.position;
        while let Some(ch) = self.peek() {
            if !is_ident_char(ch) {
                break;
            }
            self.advance();
        }

        let text: String = self.input[start..self.position].iter().collect();

        if let Some(token) = keyword(&text) {
            return token;
        }
        if text.parse::<i64>().is_ok() {
            Token::IntegerLiteral(text)
        } else {
            Token::Illegal(text)
        }
    }
}

fn is_whitespace(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\n' | '\r')
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize(input: &str) -> Vec<Token> {
        Tokenizer::new(input)
            .tokenize()
            .into_iter()
            .map(|st| st.token)
            .collect()
    }

    fn first_significant(input: &str) -> Token {
        Tokenizer::new(input).next_significant().token
    }

    // ── Keywords ───────────────────────────────────────

    #[test]
    fn test_tokenize_stanza_and_command_keywords() {
        let tokens = tokenize("handle client expect tx");
        assert_eq!(tokens, vec![
            Token::Handle,
            Token::Client,
            Token::Expect,
            Token::Tx,
            Token::Eof,
        ]);
    }

    #[test]
    fn test_tokenize_field_keywords() {
        let tokens = tokenize("req resp method status headers body");
        assert_eq!(tokens, vec![
            Token::Req,
            Token::Resp,
            Token::Method,
            Token::Status,
            Token::Headers,
            Token::Body,
            Token::Eof,
        ]);
    }

    #[test]
    fn test_tokenize_flags() {
        let tokens = tokenize("-body -status -header -method -url");
        assert_eq!(tokens, vec![
            Token::BodyFlag,
            Token::StatusFlag,
            Token::HeaderFlag,
            Token::MethodFlag,
            Token::UrlFlag,
            Token::Eof,
        ]);
    }

    #[test]
    fn test_keywords_are_case_sensitive() {
        let tokens = tokenize("Handle EQ");
        assert_eq!(tokens, vec![
            Token::Illegal("Handle".to_string()),
            Token::Illegal("EQ".to_string()),
            Token::Eof,
        ]);
    }

    #[test]
    fn test_unknown_flag_is_illegal() {
        assert_eq!(
            first_significant("-status-code"),
            Token::Illegal("-status-code".to_string())
        );
    }

    // ── Operators & punctuation ────────────────────────

    #[test]
    fn test_tokenize_operators() {
        let tokens = tokenize("eq ne ~");
        assert_eq!(tokens, vec![Token::Eq, Token::Ne, Token::Tilde, Token::Eof]);
    }

    #[test]
    fn test_tokenize_punctuation() {
        let tokens = tokenize(". [ ] { }");
        assert_eq!(tokens, vec![
            Token::Dot,
            Token::LBracket,
            Token::RBracket,
            Token::LBrace,
            Token::RBrace,
            Token::Eof,
        ]);
    }

    #[test]
    fn test_punctuation_needs_no_separator() {
        let tokens = tokenize(r#"req.headers["Host"]"#);
        assert_eq!(tokens, vec![
            Token::Req,
            Token::Dot,
            Token::Headers,
            Token::LBracket,
            Token::StringLiteral("Host".to_string()),
            Token::RBracket,
            Token::Eof,
        ]);
    }

    #[test]
    fn test_unexpected_character_is_illegal() {
        assert_eq!(first_significant("$"), Token::Illegal("$".to_string()));
    }

    // ── Literals ───────────────────────────────────────

    #[test]
    fn test_tokenize_string_literal() {
        let tokens = tokenize(r#""Hello world!""#);
        assert_eq!(tokens, vec![
            Token::StringLiteral("Hello world!".to_string()),
            Token::Eof,
        ]);
    }

    #[test]
    fn test_string_has_no_escapes() {
        let tokens = tokenize(r#""^ATS/[0-9]\.[0-9]$""#);
        assert_eq!(tokens, vec![
            Token::StringLiteral(r"^ATS/[0-9]\.[0-9]$".to_string()),
            Token::Eof,
        ]);
    }

    #[test]
    fn test_string_keeps_hash_and_braces() {
        let tokens = tokenize(r##""# not a comment {}""##);
        assert_eq!(tokens, vec![
            Token::StringLiteral("# not a comment {}".to_string()),
            Token::Eof,
        ]);
    }

    #[test]
    fn test_unterminated_string_yields_what_was_read() {
        assert_eq!(first_significant("\""), Token::StringLiteral(String::new()));
        assert_eq!(
            first_significant("\"abc"),
            Token::StringLiteral("abc".to_string())
        );
    }

    #[test]
    fn test_tokenize_integers() {
        let tokens = tokenize("200 0 -1");
        assert_eq!(tokens, vec![
            Token::IntegerLiteral("200".to_string()),
            Token::IntegerLiteral("0".to_string()),
            Token::IntegerLiteral("-1".to_string()),
            Token::Eof,
        ]);
    }

    #[test]
    fn test_integer_keeps_source_digits() {
        assert_eq!(
            first_significant("0200"),
            Token::IntegerLiteral("0200".to_string())
        );
    }

    #[test]
    fn test_integer_overflow_is_illegal() {
        assert_eq!(
            first_significant("99999999999999999999"),
            Token::Illegal("99999999999999999999".to_string())
        );
    }

    // ── Whitespace, line breaks & comments ─────────────

    #[test]
    fn test_raw_scan_of_comment_is_line_break() {
        let mut tokenizer = Tokenizer::new("# banana potato\n  \n\n handle");
        assert_eq!(tokenizer.next_token().token, Token::Newline);
        assert_eq!(tokenizer.next_token().token, Token::Newline);
        assert_eq!(tokenizer.next_token().token, Token::Handle);
    }

    #[test]
    fn test_raw_scan_whitespace_without_newline() {
        let mut tokenizer = Tokenizer::new(" \t handle");
        assert_eq!(tokenizer.next_token().token, Token::Whitespace);
        assert_eq!(tokenizer.next_token().token, Token::Handle);
    }

    #[test]
    fn test_significant_skips_comments() {
        assert_eq!(
            first_significant("# banana potato\n\"ciao\""),
            Token::StringLiteral("ciao".to_string())
        );
    }

    #[test]
    fn test_comment_at_end_of_input() {
        assert_eq!(first_significant("# banana"), Token::Eof);
    }

    #[test]
    fn test_only_whitespace() {
        assert_eq!(tokenize("     "), vec![Token::Eof]);
        assert_eq!(tokenize("  \r\n\t\n"), vec![Token::Eof]);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(tokenize(""), vec![Token::Eof]);
    }

    #[test]
    fn test_eof_is_sticky() {
        let mut tokenizer = Tokenizer::new("tx");
        assert_eq!(tokenizer.next_token().token, Token::Tx);
        for _ in 0..3 {
            assert_eq!(tokenizer.next_token().token, Token::Eof);
        }
    }

    #[test]
    fn test_next_in_statement_stops_at_line_break() {
        let mut tokenizer = Tokenizer::new("-body \"x\"  # trailing\nexpect");
        assert_eq!(tokenizer.next_in_statement().token, Token::BodyFlag);
        assert_eq!(
            tokenizer.next_in_statement().token,
            Token::StringLiteral("x".to_string())
        );
        assert_eq!(tokenizer.next_in_statement().token, Token::Newline);
        assert_eq!(tokenizer.next_in_statement().token, Token::Expect);
    }

    // ── Pushback ───────────────────────────────────────

    #[test]
    fn test_unread_returns_same_token() {
        let mut tokenizer = Tokenizer::new("{ }");
        let open = tokenizer.next_significant();
        tokenizer.unread(open.clone());
        assert_eq!(tokenizer.next_significant(), open);
        assert_eq!(tokenizer.next_significant().token, Token::RBrace);
    }

    // ── Display ────────────────────────────────────────

    #[test]
    fn test_token_display() {
        assert_eq!(Token::Status.to_string(), "status");
        assert_eq!(Token::IntegerLiteral("200".to_string()).to_string(), "INTEGER: 200");
        assert_eq!(
            Token::StringLiteral("200".to_string()).to_string(),
            "STRING: 200"
        );
        assert_eq!(
            Token::Illegal("200".to_string()).to_string(),
            "ILLEGAL token \"200\""
        );
        assert_eq!(Token::Eof.to_string(), "EOF");
        assert_eq!(Token::UrlFlag.to_string(), "-url");
    }

    // ── Span tracking ──────────────────────────────────

    #[test]
    fn test_span_tracking() {
        let tokens = Tokenizer::new("handle \"/a\" {\n  tx\n}").tokenize();
        assert_eq!(tokens[0].span, Span { line: 1, column: 1, offset: 0 });
        assert_eq!(tokens[1].span, Span { line: 1, column: 8, offset: 7 });
        assert_eq!(tokens[2].span, Span { line: 1, column: 13, offset: 12 });
        assert_eq!(tokens[3].span, Span { line: 2, column: 3, offset: 16 });
        assert_eq!(tokens[3].token, Token::Tx);
        assert_eq!(tokens[4].span, Span { line: 3, column: 1, offset: 19 });
        assert_eq!(tokens[4].token, Token::RBrace);
    }

    // ── Integration: full script ───────────────────────

    #[test]
    fn test_tokenize_full_script() {
        let input = r#"# Test a basic get request

handle "/endpoint/1" {
    expect req.method eq "GET"
    tx -body "Hello world!" -status 200
}
"#;
        let tokens = tokenize(input);
        assert_eq!(tokens, vec![
            Token::Handle,
            Token::StringLiteral("/endpoint/1".to_string()),
            Token::LBrace,
            Token::Expect,
            Token::Req,
            Token::Dot,
            Token::Method,
            Token::Eq,
            Token::StringLiteral("GET".to_string()),
            Token::Tx,
            Token::BodyFlag,
            Token::StringLiteral("Hello world!".to_string()),
            Token::StatusFlag,
            Token::IntegerLiteral("200".to_string()),
            Token::RBrace,
            Token::Eof,
        ]);
    }

    #[test]
    fn test_tokenize_determinism_100_iterations() {
        let input = include_str!("../../../../tests/fixtures/valid/basic-get.htc");
        let first = Tokenizer::new(input).tokenize();
        for i in 0..100 {
            let result = Tokenizer::new(input).tokenize();
            assert_eq!(first, result, "Determinism failure at iteration {}", i);
        }
    }
}
