//! ImageJ macro argument contract.
//!
//! Macros receive a single argument string `input:output[:param...]` and
//! split it on `:` to recover their positional arguments.
pub mod args;
pub mod invocation;
pub mod parser;
pub mod serializer;

pub use args::MacroArgs;
pub use invocation::ImageJInvocation;
pub use parser::{parse_macro_args, ParseError};
pub use serializer::{serialize_macro_args, SerializeError};

/// Field separator of the macro argument string
pub const SEPARATOR: char = ':';
