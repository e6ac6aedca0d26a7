use std::collections::HashMap;

use vela_core::Location;
use vela_ir::diagnostic::{Diagnostic, Severity};
use winnow::ascii::{digit1, space0};
use winnow::combinator::{alt, opt, preceded};
use winnow::token::{take_until, take_while};
use winnow::{PResult, Parser};

/// A diagnostic the input says should be produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expectation {
    pub severity: Severity,
    pub line: u32,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct AnnotationError {
    pub line: u32,
    pub message: String,
}

enum Offset<'a> {
    Relative(i64),
    Absolute(u32),
    Marker(&'a str),
}

const ANNOTATION: &str = "expected-";

fn marker_name<'a>(i: &mut &'a str) -> PResult<&'a str> {
    take_while(1.., |c: char| c.is_alphanumeric() || c == '_' || c == '-').parse_next(i)
}

fn offset<'a>(i: &mut &'a str) -> PResult<Offset<'a>> {
    alt((
        preceded('+', digit1.try_map(str::parse::<i64>)).map(Offset::Relative),
        preceded('-', digit1.try_map(str::parse::<i64>)).map(|n| Offset::Relative(-n)),
        digit1.try_map(str::parse::<u32>).map(Offset::Absolute),
        preceded('#', marker_name).map(Offset::Marker),
    ))
    .parse_next(i)
}

/// `expected-<severity>[@offset]`
fn header<'a>(i: &mut &'a str) -> PResult<(&'a str, Option<Offset<'a>>)> {
    preceded(
        ANNOTATION,
        (
            take_while(1.., |c: char| c.is_ascii_alphabetic()),
            opt(preceded('@', offset)),
        ),
    )
    .parse_next(i)
}

fn open_braces(i: &mut &str) -> PResult<()> {
    (space0, "{{").void().parse_next(i)
}

fn body<'a>(i: &mut &'a str) -> PResult<&'a str> {
    let text = take_until(0.., "}}").parse_next(i)?;
    "}}".parse_next(i)?;
    Ok(text)
}

/// The comment part of a line, if any.
fn comment(line: &str) -> Option<&str> {
    line.find("//").map(|start| &line[start + 2..])
}

/// `comment` with every `{{...}}` span removed, so expected texts cannot define markers.
fn outside_braces(comment: &str) -> String {
    let mut out = String::new();
    let mut rest = comment;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        match rest[start..].find("}}") {
            Some(end) => rest = &rest[start + end + 2..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

fn collect_markers(text: &str) -> Result<HashMap<String, u32>, AnnotationError> {
    let mut markers = HashMap::new();
    for (index, line) in text.lines().enumerate() {
        let line_no = index as u32 + 1;
        let Some(comment) = comment(line) else {
            continue;
        };
        let visible = outside_braces(comment);
        let mut previous = None;
        for (pos, c) in visible.char_indices() {
            if c == '#' && previous != Some('@') {
                let mut rest = &visible[pos + 1..];
                if let Ok(name) = marker_name(&mut rest) {
                    if markers.insert(name.to_string(), line_no).is_some() {
                        return Err(AnnotationError {
                            line: line_no,
                            message: format!("redefinition of marker '#{name}'"),
                        });
                    }
                }
            }
            previous = Some(c);
        }
    }
    Ok(markers)
}

/// Recovers the `expected-*` annotations of `text`, in order of appearance.
pub fn parse_expectations(text: &str) -> Result<Vec<Expectation>, AnnotationError> {
    let markers = collect_markers(text)?;
    let line_count = text.lines().count() as i64;
    let mut expectations = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line_no = index as u32 + 1;
        let error = |message: String| AnnotationError {
            line: line_no,
            message,
        };
        let Some(mut rest) = comment(line) else {
            continue;
        };
        while let Some(start) = rest.find(ANNOTATION) {
            rest = &rest[start..];
            let (severity, offset) = header
                .parse_next(&mut rest)
                .map_err(|_| error("malformed annotation".to_string()))?;
            let severity = Severity::from_name(severity)
                .ok_or_else(|| error(format!("unknown severity '{severity}'")))?;
            let target = match offset {
                None => i64::from(line_no),
                Some(Offset::Relative(delta)) => i64::from(line_no) + delta,
                Some(Offset::Absolute(line)) => i64::from(line),
                Some(Offset::Marker(name)) => markers
                    .get(name)
                    .map(|line| i64::from(*line))
                    .ok_or_else(|| error(format!("use of undefined marker '#{name}'")))?,
            };
            if !(1..=line_count).contains(&target) {
                return Err(error(format!("line {target} is outside the file")));
            }
            open_braces
                .parse_next(&mut rest)
                .map_err(|_| error("expected '{{' after annotation".to_string()))?;
            let expected = body
                .parse_next(&mut rest)
                .map_err(|_| error("missing '}}' at the end of annotation".to_string()))?;
            expectations.push(Expectation {
                severity,
                line: target as u32,
                text: expected.to_string(),
            });
        }
    }
    Ok(expectations)
}

fn satisfies(expectation: &Expectation, diagnostic: &Diagnostic) -> bool {
    diagnostic.severity == expectation.severity
        && diagnostic.location.map(|loc| loc.line) == Some(expectation.line)
        && diagnostic.message.contains(&expectation.text)
}

/// Tries to give `expectation` a diagnostic, moving earlier claims along augmenting paths.
fn augment(
    expectation: usize,
    candidates: &[Vec<usize>],
    visited: &mut [bool],
    owner: &mut [Option<usize>],
) -> bool {
    for &diagnostic in &candidates[expectation] {
        if visited[diagnostic] {
            continue;
        }
        visited[diagnostic] = true;
        let free = match owner[diagnostic] {
            None => true,
            Some(other) => augment(other, candidates, visited, owner),
        };
        if free {
            owner[diagnostic] = Some(expectation);
            return true;
        }
    }
    false
}

/// Matches expectations against the produced diagnostics with a maximum bipartite matching, so
/// the outcome does not depend on annotation order. Returns one error diagnostic per
/// mismatch; unclaimed notes are not mismatches.
pub fn check(expectations: &[Expectation], diagnostics: &[Diagnostic]) -> Vec<Diagnostic> {
    let candidates: Vec<Vec<usize>> = expectations
        .iter()
        .map(|expectation| {
            diagnostics
                .iter()
                .enumerate()
                .filter(|(_, diagnostic)| satisfies(expectation, diagnostic))
                .map(|(index, _)| index)
                .collect()
        })
        .collect();
    let mut owner = vec![None; diagnostics.len()];
    for expectation in 0..expectations.len() {
        let mut visited = vec![false; diagnostics.len()];
        augment(expectation, &candidates, &mut visited, &mut owner);
    }

    let mut satisfied = vec![false; expectations.len()];
    for expectation in owner.iter().flatten() {
        satisfied[*expectation] = true;
    }
    let mut failures = Vec::new();
    for (expectation, _) in expectations
        .iter()
        .zip(satisfied)
        .filter(|(_, satisfied)| !satisfied)
    {
        failures.push(Diagnostic::new(
            Severity::Error,
            Some(Location::new(expectation.line, 1)),
            format!(
                "expected {} not produced: {}",
                expectation.severity, expectation.text
            ),
        ));
    }
    for (diagnostic, owner) in diagnostics.iter().zip(owner) {
        if owner.is_some() || diagnostic.severity == Severity::Note {
            continue;
        }
        failures.push(Diagnostic::new(
            Severity::Error,
            diagnostic.location,
            format!(
                "unexpected {} produced: {}",
                diagnostic.severity, diagnostic.message
            ),
        ));
    }
    failures
}
