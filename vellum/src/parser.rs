use nom::{
    branch::alt,
    combinator::value,
    error::{ErrorKind, ParseError as NomParseError},
    multi::many0_count,
    sequence::{delimited, preceded, terminated},
    IResult, InputTakeAtPosition, Parser,
};

mod file;
mod object;

pub use file::*;
pub use object::*;

// Set `nom::error::VerboseError<&'a [u8]>` for detailed errors
#[cfg(not(debug_assertions))]
pub type ParseError<'a> = nom::error::Error<&'a [u8]>;
#[cfg(debug_assertions)]
pub type ParseError<'a> = nom::error::VerboseError<&'a [u8]>;
pub type ParseResult<'a, O, E = ParseError<'a>> = IResult<&'a [u8], O, E>;

/// Error at file structure level.
#[derive(Clone, PartialEq, Eq, Debug, thiserror::Error)]
pub enum FileError {
    #[error("not a document file")]
    InvalidHeader,
    #[error("unsupported version: {0}")]
    UnsupportedVersion(String),
}

/// Byte offset of `remains` inside `whole`, for error reporting.
pub fn offset_in(whole: &[u8], remains: &[u8]) -> usize {
    whole.len() - remains.len()
}

/// Byte offset a parse error points at.
#[cfg(debug_assertions)]
pub fn error_offset(whole: &[u8], e: &ParseError) -> usize {
    e.errors
        .first()
        .map_or(whole.len(), |(i, _)| offset_in(whole, i))
}

#[cfg(not(debug_assertions))]
pub fn error_offset(whole: &[u8], e: &ParseError) -> usize {
    offset_in(whole, e.input)
}

fn comment(buf: &[u8]) -> ParseResult<'_, ()> {
    let (buf, _) = nom::bytes::complete::tag(b"%")(buf)?;
    let (buf, content) = nom::bytes::complete::is_not("\n\r")(buf)?;
    if content.starts_with(b"PDF-") || content.starts_with(b"%EOF") {
        return Err(nom::Err::Error(ParseError::from_error_kind(
            buf,
            ErrorKind::Fail,
        )));
    }
    Ok((buf, ()))
}

fn whitespace1<T, E: nom::error::ParseError<T>>(input: T) -> IResult<T, T, E>
where
    T: InputTakeAtPosition<Item = u8>,
{
    // '\0' excluded: after the `stream` keyword a NUL may open the
    // stream payload
    input.split_at_position1_complete(
        |c| !(c == b' ' || c == b'\t' || c == b'\r' || c == b'\n' || c == b'\x0C'),
        nom::error::ErrorKind::MultiSpace,
    )
}

pub(crate) fn whitespace_or_comment(input: &[u8]) -> ParseResult<'_, ()> {
    value((), many0_count(alt((value((), whitespace1), comment))))(input)
}

pub(crate) fn ws_prefixed<'a, F, O>(inner: F) -> impl FnMut(&'a [u8]) -> ParseResult<'_, O>
where
    F: Parser<&'a [u8], O, ParseError<'a>>,
{
    preceded(whitespace_or_comment, inner)
}

/// A combinator that takes a parser `inner` and produces a parser that
/// also consumes both leading and trailing whitespace, returning the
/// output of `inner`.
fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a [u8]) -> ParseResult<'_, O>
where
    F: Parser<&'a [u8], O, ParseError<'a>>,
{
    delimited(whitespace_or_comment, inner, whitespace_or_comment)
}

pub(crate) fn ws_terminated<'a, F, O>(inner: F) -> impl FnMut(&'a [u8]) -> ParseResult<'_, O>
where
    F: Parser<&'a [u8], O, ParseError<'a>>,
{
    terminated(inner, whitespace_or_comment)
}
