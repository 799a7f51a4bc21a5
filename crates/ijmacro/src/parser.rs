use crate::args::MacroArgs;
use crate::SEPARATOR;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty argument string")]
    Empty,
    #[error("missing output field")]
    MissingOutput,
    #[error("field {0} is empty")]
    EmptyField(usize),
}

/// Splits strictly on `:`. Field 0 is the input path, field 1 the output
/// path, the rest are extra parameters kept verbatim.
pub fn parse_macro_args(input: &str) -> Result<MacroArgs, ParseError> {
    if input.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut fields = input.split(SEPARATOR);
    let source = fields.next().ok_or(ParseError::Empty)?;
    let output = fields.next().ok_or(ParseError::MissingOutput)?;

    if source.is_empty() {
        return Err(ParseError::EmptyField(0));
    }
    if output.is_empty() {
        return Err(ParseError::EmptyField(1));
    }

    Ok(MacroArgs {
        input: PathBuf::from(source),
        output: PathBuf::from(output),
        extra: fields.map(str::to_string).collect(),
    })
}
