//! S-expression reader.
//!
//! Turns source text into the [`Value`] trees the evaluator consumes. `parse_scheme` reads
//! exactly one expression; [`SchemeReader`] walks every top-level form of a larger text.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, digit0, digit1, multispace0, multispace1, not_line_ending, one_of},
    combinator::{cut, opt, recognize, value},
    error::ErrorKind,
    multi::many0_count,
};
use tracing::debug;

use crate::ast::{NumberType, SYMBOL_SPECIAL_CHARS, Value, is_valid_symbol};
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Reader options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseConfig {
    /// Treat `;` to end of line as whitespace
    pub handle_comments: bool,
}

impl Default for ParseConfig {
    fn default() -> Self {
        ParseConfig {
            handle_comments: true,
        }
    }
}

type ParseResult<'a, T> = IResult<&'a str, T>;

fn syntax_error(input: &str, code: ErrorKind) -> nom::Err<nom::error::Error<&str>> {
    nom::Err::Error(nom::error::Error::new(input, code))
}

fn syntax_failure(input: &str, code: ErrorKind) -> nom::Err<nom::error::Error<&str>> {
    nom::Err::Failure(nom::error::Error::new(input, code))
}

/// Convert nom parsing errors to a structured [`ParseError`]
fn to_parse_error(input: &str, error: nom::Err<nom::error::Error<&str>>) -> ParseError {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let offset = input.len().saturating_sub(e.input.len());
            let char_offset = input.get(..offset).map_or(0, |s| s.chars().count());

            let (kind, message) = if e.code == ErrorKind::TooLarge {
                (
                    ParseErrorKind::TooDeeplyNested,
                    format!("Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
                )
            } else if e.input.trim().is_empty() {
                (ParseErrorKind::Incomplete, "Unexpected end of input".into())
            } else {
                let message = match e.code {
                    ErrorKind::Escaped => format!("Unknown escape sequence at position {offset}"),
                    ErrorKind::Digit => "Number literal out of range".into(),
                    ErrorKind::Char => format!("Unexpected character at position {offset}"),
                    _ => {
                        let near: String = e.input.chars().take(10).collect();
                        format!("Invalid syntax near '{near}'")
                    }
                };
                (ParseErrorKind::InvalidSyntax, message)
            };
            ParseError::with_context(kind, message, input, char_offset)
        }
        nom::Err::Incomplete(_) => {
            ParseError::from_message(ParseErrorKind::Incomplete, "Incomplete input")
        }
    }
}

/// Skip whitespace and, when enabled, line comments
fn skip_whitespace(input: &str, config: ParseConfig) -> ParseResult<'_, ()> {
    if config.handle_comments {
        value(
            (),
            many0_count(alt((multispace1, recognize((char(';'), not_line_ending))))),
        )
        .parse(input)
    } else {
        value((), multispace0).parse(input)
    }
}

/// True if an atom may end right before `input`
fn at_delimiter(input: &str) -> bool {
    input
        .chars()
        .next()
        .is_none_or(|c| c.is_whitespace() || matches!(c, '(' | ')' | '\'' | '"' | ';'))
}

/// Run an atom parser and require a delimiter after it, so `123abc` is not `123` then `abc`
fn delimited_atom<'a>(
    mut parser: impl Parser<&'a str, Output = Value, Error = nom::error::Error<&'a str>>,
) -> impl FnMut(&'a str) -> ParseResult<'a, Value> {
    move |input| {
        let (rest, parsed) = parser.parse(input)?;
        if at_delimiter(rest) {
            Ok((rest, parsed))
        } else {
            Err(syntax_error(input, ErrorKind::Verify))
        }
    }
}

/// Parse a number: hexadecimal, the IEEE specials, or a decimal integer or float
fn parse_number(input: &str) -> ParseResult<'_, Value> {
    alt((parse_hexadecimal, parse_special_float, parse_decimal)).parse(input)
}

fn parse_decimal(input: &str) -> ParseResult<'_, Value> {
    let mantissa = alt((
        recognize((digit1, opt((char('.'), digit0)))),
        recognize((char('.'), digit1)),
    ));
    let exponent = (one_of("eE"), opt(one_of("+-")), digit1);
    let (rest, text) = recognize((opt(one_of("+-")), mantissa, opt(exponent))).parse(input)?;

    if text.contains(['.', 'e', 'E']) {
        return match text.parse::<f64>() {
            Ok(x) => Ok((rest, Value::float(x))),
            Err(_) => Err(syntax_error(input, ErrorKind::Float)),
        };
    }

    match text.parse::<NumberType>() {
        Ok(n) => Ok((rest, Value::integer(n))),
        Err(_) => Err(syntax_failure(input, ErrorKind::Digit)),
    }
}

/// Parse a hexadecimal integer (#x or #X prefix)
fn parse_hexadecimal(input: &str) -> ParseResult<'_, Value> {
    let (rest, _) = (char('#'), one_of("xX")).parse(input)?;
    let (rest, hex_digits) = take_while1(|c: char| c.is_ascii_hexdigit()).parse(rest)?;

    match NumberType::from_str_radix(hex_digits, 16) {
        Ok(n) => Ok((rest, Value::integer(n))),
        Err(_) => Err(syntax_failure(input, ErrorKind::Digit)),
    }
}

fn parse_special_float(input: &str) -> ParseResult<'_, Value> {
    let specials = [
        ("+inf.0", f64::INFINITY),
        ("-inf.0", f64::NEG_INFINITY),
        ("+nan.0", f64::NAN),
    ];
    specials
        .iter()
        .find_map(|(text, x)| input.strip_prefix(text).map(|rest| (rest, Value::float(*x))))
        .ok_or_else(|| syntax_error(input, ErrorKind::Float))
}

/// Parse a boolean (#t or #f)
fn parse_bool(input: &str) -> ParseResult<'_, Value> {
    let (rest, _) = char('#').parse(input)?;
    alt((
        value(Value::TRUE, char('t')),
        value(Value::FALSE, char('f')),
    ))
    .parse(rest)
}

/// Parse a symbol (identifier)
fn parse_symbol(input: &str) -> ParseResult<'_, Value> {
    let (rest, candidate) =
        take_while1(|c: char| c.is_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(c))
            .parse(input)?;

    if is_valid_symbol(candidate) {
        Ok((rest, Value::symbol(candidate)))
    } else {
        Err(syntax_error(input, ErrorKind::Alpha))
    }
}

/// Parse a string literal. Nothing after the opening quote backtracks.
fn parse_string(input: &str) -> ParseResult<'_, Value> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut text = String::new();

    loop {
        let mut chars = remaining.chars();
        match chars.next() {
            Some('"') => return Ok((chars.as_str(), Value::from(text))),
            Some('\\') => {
                let escaped = match chars.next() {
                    Some('n') => '\n',
                    Some('t') => '\t',
                    Some('r') => '\r',
                    Some('\\') => '\\',
                    Some('"') => '"',
                    Some(_) => return Err(syntax_failure(remaining, ErrorKind::Escaped)),
                    None => return Err(syntax_failure(chars.as_str(), ErrorKind::Char)),
                };
                text.push(escaped);
            }
            Some(ch) => text.push(ch),
            None => return Err(syntax_failure(remaining, ErrorKind::Char)),
        }
        remaining = chars.as_str();
    }
}

/// Parse a list, including the dotted tail of an improper list
fn parse_list(input: &str, config: ParseConfig, depth: usize) -> ParseResult<'_, Value> {
    let (mut input, _) = char('(').parse(input)?;
    let mut items = Vec::new();

    loop {
        let (rest, _) = skip_whitespace(input, config)?;

        if let Some(rest) = rest.strip_prefix(')') {
            return Ok((rest, Value::list(items)));
        }

        if !items.is_empty()
            && let Some(after_dot) = rest.strip_prefix('.')
            && at_delimiter(after_dot)
        {
            let (rest, tail) = cut(|i| parse_sexpr(i, config, depth + 1)).parse(after_dot)?;
            let (rest, _) = skip_whitespace(rest, config)?;
            let (rest, _) = cut(char(')')).parse(rest)?;
            return Ok((rest, Value::list_with_tail(items, tail)));
        }

        let (rest, item) = cut(|i| parse_sexpr(i, config, depth + 1)).parse(rest)?;
        items.push(item);
        input = rest;
    }
}

/// Parse quoted expression ('expr -> (quote expr))
fn parse_quote(input: &str, config: ParseConfig, depth: usize) -> ParseResult<'_, Value> {
    let (input, _) = char('\'').parse(input)?;
    let (input, expr) = cut(|i| parse_sexpr(i, config, depth + 1)).parse(input)?;
    Ok((input, Value::list([Value::symbol("quote"), expr])))
}

/// Parse one S-expression after optional leading whitespace
fn parse_sexpr(input: &str, config: ParseConfig, depth: usize) -> ParseResult<'_, Value> {
    if depth >= MAX_PARSE_DEPTH {
        return Err(syntax_failure(input, ErrorKind::TooLarge));
    }
    let (input, _) = skip_whitespace(input, config)?;
    alt((
        |i| parse_quote(i, config, depth),
        |i| parse_list(i, config, depth),
        parse_string,
        delimited_atom(parse_number),
        delimited_atom(parse_bool),
        delimited_atom(parse_symbol),
    ))
    .parse(input)
}

/// Parse exactly one expression, without comment handling.
pub fn parse_scheme(input: &str) -> Result<Value, Error> {
    parse_scheme_with_config(
        input,
        ParseConfig {
            handle_comments: false,
        },
    )
}

/// Parse exactly one expression. Anything but whitespace (or comments) after it is an error.
pub fn parse_scheme_with_config(input: &str, config: ParseConfig) -> Result<Value, Error> {
    let parsed = parse_sexpr(input, config, 0)
        .and_then(|(rest, value)| skip_whitespace(rest, config).map(|(rest, _)| (rest, value)));

    let err = match parsed {
        Ok(("", value)) => return Ok(value),
        Ok((remaining, _)) => {
            let offset = input.len().saturating_sub(remaining.len());
            let char_offset = input.get(..offset).map_or(0, |s| s.chars().count());
            ParseError::with_context(
                ParseErrorKind::TrailingContent,
                format!("Unexpected remaining input: '{remaining}'"),
                input,
                char_offset,
            )
        }
        Err(e) => to_parse_error(input, e),
    };
    debug!(error = %err, "parse failed");
    Err(Error::ParseError(err))
}

/// Iterator over the top-level forms of a source text.
///
/// Yields one `Result` per form and stops after the first parse error.
///
/// ```
/// use minischeme::scheme::SchemeReader;
///
/// let forms: Vec<_> = SchemeReader::new("(define x 1) ; one\n x").collect();
/// assert_eq!(forms.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct SchemeReader {
    source: String,
    position: usize,
    config: ParseConfig,
    failed: bool,
}

impl SchemeReader {
    pub fn new(source: &str) -> Self {
        Self::with_config(source, ParseConfig::default())
    }

    pub fn with_config(source: &str, config: ParseConfig) -> Self {
        SchemeReader {
            source: source.to_owned(),
            position: 0,
            config,
            failed: false,
        }
    }
}

impl Iterator for SchemeReader {
    type Item = Result<Value, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let unread = self.source.get(self.position..)?;
        let start = match skip_whitespace(unread, self.config) {
            Ok((rest, _)) if rest.is_empty() => {
                self.position = self.source.len();
                return None;
            }
            Ok((rest, _)) => rest,
            Err(_) => unread,
        };

        match parse_sexpr(start, self.config, 0) {
            Ok((rest, value)) => {
                self.position = self.source.len() - rest.len();
                Some(Ok(value))
            }
            Err(e) => {
                let err = to_parse_error(start, e);
                debug!(error = %err, "parse failed");
                self.failed = true;
                Some(Err(Error::ParseError(err)))
            }
        }
    }
}
