//! Reader core for the anise language: turns S-expression text into
//! in-memory data values. Atoms, collections, regex and tagged literals,
//! plus the reader shorthands (quote, deref, metadata, syntax-quote,
//! anonymous-function literals) are all handled here; evaluation is not.

pub mod error;
pub mod instant;
pub mod pushback;
pub mod reader;
pub mod reader_tags;
pub mod resolver;
pub mod value;

mod number;
mod string_escape;
mod symbols;
mod syntax_quote;

pub use error::ReaderError;
pub use reader::{ReadOutcome, Reader, ReaderOptions};
pub use value::{Keyword, Symbol, Value, ValueKind};

/// Read exactly one top-level form from the text.
pub fn read_string(source: &str) -> Result<Value, ReaderError> {
    let mut reader = Reader::new(source);
    match reader.read(true)? {
        Some(value) => Ok(value),
        None => Err(ReaderError::eof("EOF while reading")),
    }
}

/// Read every top-level form from the text.
pub fn read_all(source: &str) -> Result<Vec<Value>, ReaderError> {
    Reader::new(source).read_all()
}
