use crate::args::MacroArgs;
use crate::SEPARATOR;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SerializeError {
    #[error("field {field} contains ':': {value}")]
    Separator { field: usize, value: String },
    #[error("field {0} is empty")]
    EmptyField(usize),
    #[error("path is not valid UTF-8: {0}")]
    NonUtf8(String),
}

/// Joins the fields with `:`. A field holding `:` itself would be split
/// apart by the macro, so it is refused.
pub fn serialize_macro_args(args: &MacroArgs) -> Result<String, SerializeError> {
    let mut fields = Vec::with_capacity(2 + args.extra.len());
    fields.push(path_field(&args.input, 0)?);
    fields.push(path_field(&args.output, 1)?);
    fields.extend(args.extra.iter().map(String::as_str));

    for (field, value) in fields.iter().enumerate() {
        if value.contains(SEPARATOR) {
            return Err(SerializeError::Separator {
                field,
                value: value.to_string(),
            });
        }
    }

    Ok(fields.join(":"))
}

fn path_field(path: &Path, field: usize) -> Result<&str, SerializeError> {
    let value = path
        .to_str()
        .ok_or_else(|| SerializeError::NonUtf8(path.to_string_lossy().into_owned()))?;
    if value.is_empty() {
        return Err(SerializeError::EmptyField(field));
    }
    Ok(value)
}
