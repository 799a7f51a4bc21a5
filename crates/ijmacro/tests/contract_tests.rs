//! Tests of the colon-delimited argument contract shared with the macros.

use ijmacro::{parse_macro_args, serialize_macro_args, MacroArgs, ParseError, SerializeError};
use std::path::PathBuf;

#[test]
fn test_input_and_output_positions() {
    let args = parse_macro_args("img.tif:out.tif").unwrap();
    assert_eq!(args.input, PathBuf::from("img.tif"));
    assert_eq!(args.output, PathBuf::from("out.tif"));
    assert!(args.extra.is_empty());
}

#[test]
fn test_extra_parameters_kept_in_order() {
    let args = parse_macro_args("/data/a.tif:/data/b.tif:Otsu:3").unwrap();
    assert_eq!(args.extra, vec!["Otsu", "3"]);
}

#[test]
fn test_split_is_strict() {
    // Empty extras are preserved, nothing is trimmed or collapsed.
    let args = parse_macro_args("a.tif:b.tif::  x ").unwrap();
    assert_eq!(args.extra, vec!["", "  x "]);
}

#[test]
fn test_malformed_strings() {
    assert_eq!(parse_macro_args(""), Err(ParseError::Empty));
    assert_eq!(parse_macro_args("only-input.tif"), Err(ParseError::MissingOutput));
    assert_eq!(parse_macro_args(":out.tif"), Err(ParseError::EmptyField(0)));
    assert_eq!(parse_macro_args("in.tif:"), Err(ParseError::EmptyField(1)));
}

#[test]
fn test_serialize_matches_macro_expectation() {
    let args =
        MacroArgs::new("/data/myxo-small.tif", "/data/myxo-small_seg.tif").with_param("Default");
    assert_eq!(
        serialize_macro_args(&args).unwrap(),
        "/data/myxo-small.tif:/data/myxo-small_seg.tif:Default"
    );
}

#[test]
fn test_serialize_refuses_separator_in_field() {
    let args = MacroArgs::new("C:/images/in.tif", "out.tif");
    assert!(matches!(
        serialize_macro_args(&args),
        Err(SerializeError::Separator { field: 0, .. })
    ));

    let args = MacroArgs::new("in.tif", "out.tif").with_param("a:b");
    assert!(matches!(
        serialize_macro_args(&args),
        Err(SerializeError::Separator { field: 2, .. })
    ));
}

#[test]
fn test_serialize_refuses_empty_output() {
    let args = MacroArgs::new("in.tif", "");
    assert_eq!(serialize_macro_args(&args), Err(SerializeError::EmptyField(1)));
}

#[test]
fn test_empty_extras_keep_their_positions() {
    let args = MacroArgs::new("in.tif", "out.tif").with_param("").with_param("Otsu");
    let line = serialize_macro_args(&args).unwrap();
    assert_eq!(line, "in.tif:out.tif::Otsu");
    assert_eq!(parse_macro_args(&line).unwrap(), args);

    let trailing = MacroArgs::new("in.tif", "out.tif").with_param("");
    let line = serialize_macro_args(&trailing).unwrap();
    assert_eq!(line, "in.tif:out.tif:");
    assert_eq!(parse_macro_args(&line).unwrap().extra, vec![""]);
}
