//! HTC Core - the HTTP Test Case language engine
//!
//! HTC scripts drive black-box tests of HTTP intermediaries. `handle`
//! stanzas describe a mock origin (assertions on the inbound request plus a
//! canned response); `client` stanzas describe a request to send through
//! the intermediary and assertions on the response that comes back.
//!
//! # Architecture
//!
//! ```text
//! HTC Text → Tokenizer → Parser → Program
//!                                    ↓
//!                                 Verifier → static diagnostics
//!                                    ↓
//!             live request/response → Evaluator → verdict + actual value
//! ```
//!
//! The network side (mock origin, client, proxy under test) lives in
//! `htc-cli`; this crate does no I/O.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//!
//! let program = htc_core::parse(r#"
//!     client "c" {
//!         tx -url "/"
//!         expect resp.status eq 200
//!     }
//! "#).unwrap();
//!
//! let resp = http::Response::builder().status(200).body(Bytes::new()).unwrap();
//! let exp = &program.clients[0].expectations[0];
//! assert!(htc_core::evaluator::evaluate(exp, &resp).unwrap());
//! ```

pub mod error;
pub mod evaluator;
pub mod parser;
pub mod verifier;

pub use error::{Error, Result};
pub use parser::ast::*;
pub use parser::parse;

/// Version of the HTC language engine
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
