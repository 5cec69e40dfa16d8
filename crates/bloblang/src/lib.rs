//! Weir Bloblang - field interpolation and query language
//!
//! Two surfaces share one parser substrate:
//!
//! - **Field interpolation** (`field`): configuration strings containing
//!   `${!expr}` fragments, evaluated per message part. `${{!expr}}` escapes
//!   to the literal text `${!expr}`.
//! - **Query expressions** (`query`): the full expression language used by
//!   processors and conditions - functions, methods, match expressions,
//!   arithmetic.
//!
//! The substrate (`parser`) is a combinator library over string input; every
//! parser reports byte-accurate positions and the alternatives it expected,
//! so malformed expressions fail loudly at configuration time.
//!
//! # Example
//!
//! ```ignore
//! use weir_bloblang::field;
//! use weir_protocol::Batch;
//!
//! let expr = field::parse("document ${!json(\"id\")} processed")?;
//! let mut batch = Batch::from_bytes(r#"{"id":"abc"}"#);
//! assert_eq!(expr.resolve_string(0, &mut batch, false), "document abc processed");
//! ```

pub mod field;
pub mod parser;
pub mod query;

mod error;

pub use error::Error;

/// Result type for bloblang operations
pub type Result<T> = std::result::Result<T, Error>;
