use vela_core::{input, Ident, Location, SourceMap};
use winnow::Parser;

use crate::{identifier, integer, location, sigiled, skip_space, string, ws_or_comment};

#[test]
fn test_parse_string() {
    let text = r#""Hello, world!""#;
    let map = SourceMap::new(text);
    let result = string.parse(input(text, &map)).unwrap();
    assert_eq!(result, "Hello, world!");

    let text = r#""Hello, \u{1F30D}!\n""#;
    let map = SourceMap::new(text);
    let result = string.parse(input(text, &map)).unwrap();
    assert_eq!(result, "Hello, 🌍!\n");
}

#[test]
fn test_parse_identifiers() {
    let text = "@Circle_area";
    let map = SourceMap::new(text);
    let result = sigiled('@').parse(input(text, &map)).unwrap();
    assert_eq!(result, Ident::new("Circle_area"));

    let text = "_tmp0";
    let map = SourceMap::new(text);
    assert_eq!(identifier.parse(input(text, &map)).unwrap(), Ident::new("_tmp0"));

    let text = "0abc";
    let map = SourceMap::new(text);
    assert!(identifier.parse(input(text, &map)).is_err());
}

#[test]
fn test_parse_integer() {
    let text = "-170141183460469231731687303715884105728";
    let map = SourceMap::new(text);
    assert_eq!(integer.parse(input(text, &map)).unwrap(), i128::MIN);
    let text = "42";
    let map = SourceMap::new(text);
    assert_eq!(integer.parse(input(text, &map)).unwrap(), 42);
}

#[test]
fn test_skip_space_and_comments() {
    let text = r#"
          // Hello, world!
          /* multi
             line */
          answer
          // trailing
        "#;
    let map = SourceMap::new(text);
    let result = skip_space(identifier).parse(input(text, &map)).unwrap();
    assert_eq!(result, Ident::new("answer"));
}

#[test]
fn test_location_after_comments() {
    let text = "// header\n  value";
    let map = SourceMap::new(text);
    let result = (ws_or_comment, location, identifier)
        .map(|(_, loc, _)| loc)
        .parse(input(text, &map))
        .unwrap();
    assert_eq!(result, Location::new(2, 3));
}
