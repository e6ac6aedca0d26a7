use unicode_ident::{is_xid_continue, is_xid_start};
use winnow::ascii::{digit1, multispace1, till_line_ending};
use winnow::combinator::{alt, delimited, opt, preceded, repeat};
use winnow::error::{ContextError, StrContext, StrContextValue};
use winnow::stream::Location as _;
use winnow::token::{one_of, take_till, take_until, take_while};
use winnow::{PResult, Parser};

use vela_core::{Ident, Input, Location};

pub fn expect(x: &'static str) -> StrContext {
    StrContext::Expected(StrContextValue::Description(x))
}

pub fn opt_or_default<'a, O, F>(f: F) -> impl Parser<Input<'a>, O, ContextError>
where
    O: Default,
    F: Parser<Input<'a>, O, ContextError>,
{
    opt(f).map(|o| o.unwrap_or_default())
}

pub fn eol_comment(i: &mut Input) -> PResult<()> {
    ("//", till_line_ending).void().parse_next(i)
}

pub fn multiline_comment(i: &mut Input) -> PResult<()> {
    ("/*", take_until(0.., "*/"), "*/").void().parse_next(i)
}

pub fn ws_or_comment(i: &mut Input) -> PResult<()> {
    repeat(
        0..,
        alt((multispace1.void(), eol_comment, multiline_comment)),
    )
    .parse_next(i)
}

/// A combinator that takes a parser `inner` and produces a parser that also consumes both leading
/// and trailing whitespace, returning the output of `inner`.
pub fn skip_space<'a, O, F>(f: F) -> impl Parser<Input<'a>, O, ContextError>
where
    F: Parser<Input<'a>, O, ContextError>,
{
    delimited(ws_or_comment, f, ws_or_comment)
}

pub fn parenthesized<'a, O, F>(f: F) -> impl Parser<Input<'a>, O, ContextError>
where
    F: Parser<Input<'a>, O, ContextError>,
{
    delimited("(", skip_space(f), ")")
}

pub fn braced<'a, O, F>(f: F) -> impl Parser<Input<'a>, O, ContextError>
where
    F: Parser<Input<'a>, O, ContextError>,
{
    delimited("{", skip_space(f), "}")
}

pub fn bracketed<'a, O, F>(f: F) -> impl Parser<Input<'a>, O, ContextError>
where
    F: Parser<Input<'a>, O, ContextError>,
{
    delimited("[", skip_space(f), "]")
}

/// The location of the next token, without consuming anything.
pub fn location(i: &mut Input) -> PResult<Location> {
    let offset = i.location();
    Ok(i.state.location(offset))
}

fn is_ident_start(c: char) -> bool {
    c == '_' || is_xid_start(c)
}

pub fn identifier(i: &mut Input) -> PResult<Ident> {
    (one_of(is_ident_start), take_while(0.., is_xid_continue))
        .recognize()
        .map(Ident::from)
        .context(expect("identifier"))
        .parse_next(i)
}

/// An identifier introduced by a sigil, such as `@main` or `$Circle`.
pub fn sigiled<'a>(sigil: char) -> impl Parser<Input<'a>, Ident, ContextError> {
    preceded(sigil, identifier)
}

pub fn integer(i: &mut Input) -> PResult<i128> {
    (opt('-'), digit1)
        .recognize()
        .try_map(|s: &str| s.parse::<i128>())
        .context(expect("integer"))
        .parse_next(i)
}

pub fn unsigned(i: &mut Input) -> PResult<u32> {
    digit1
        .try_map(|s: &str| s.parse::<u32>())
        .context(expect("unsigned integer"))
        .parse_next(i)
}

fn escape(i: &mut Input) -> PResult<char> {
    preceded(
        '\\',
        alt((
            unicode,
            'n'.value('\n'),
            'r'.value('\r'),
            't'.value('\t'),
            '\\'.value('\\'),
            '"'.value('"'),
            '\''.value('\''),
        )),
    )
    .parse_next(i)
}

fn unicode(i: &mut Input) -> PResult<char> {
    let parse_hex = take_while(1..=6, |c: char| c.is_ascii_hexdigit());
    let parse_delimited_hex = preceded('u', delimited('{', parse_hex, '}'));
    let parse_u32 = parse_delimited_hex.try_map(move |hex| u32::from_str_radix(hex, 16));
    parse_u32.verify_map(char::from_u32).parse_next(i)
}

enum StringFragment<'a> {
    Literal(&'a str),
    Escape(char),
}

fn string_literal<'a>(i: &mut Input<'a>) -> PResult<&'a str> {
    take_till(1.., ['"', '\\'])
        .verify(|s: &str| !s.is_empty())
        .parse_next(i)
}

pub fn string(i: &mut Input) -> PResult<String> {
    let build_string = repeat(
        0..,
        alt((
            string_literal.map(StringFragment::Literal),
            escape.map(StringFragment::Escape),
        )),
    )
    .fold(String::new, |mut string, fragment| {
        match fragment {
            StringFragment::Literal(s) => string.push_str(s),
            StringFragment::Escape(c) => string.push(c),
        }
        string
    });
    delimited('"', build_string, '"')
        .context(expect("string"))
        .parse_next(i)
}

#[cfg(test)]
mod tests;
