use crate::{
    machine::{Token, TokenArray, Value},
    name, sname, Name,
};
use either::Either;
use winnow::{
    combinator::{alt, opt, preceded, repeat},
    error::ContextError,
    token::{any, one_of, take_while},
    PResult, Parser,
};

const WHITE_SPACE_BYTES: &[u8] = b"\0\t\n\x0c\r ";
const DELIMITER_BYTES: &[u8] = b"()<>[]{}/%";

fn is_white_space(b: u8) -> bool {
    WHITE_SPACE_BYTES.contains(&b)
}

/// Regular bytes form numbers and names, everything else splits tokens.
fn is_regular(b: u8) -> bool {
    !is_white_space(b) && !DELIMITER_BYTES.contains(&b)
}

pub fn white_space(input: &mut &[u8]) -> PResult<()> {
    take_while(0.., is_white_space).void().parse_next(input)
}

/// `%` comment, runs to the end of line. The line ending is not consumed.
fn comment(input: &mut &[u8]) -> PResult<()> {
    (b'%', take_while(0.., |b| b != b'\n' && b != b'\r'))
        .void()
        .parse_next(input)
}

pub fn white_space_or_comment(input: &mut &[u8]) -> PResult<()> {
    repeat::<_, _, (), _, _>(0.., alt((take_while(1.., is_white_space).void(), comment)))
        .parse_next(input)
}

pub fn ws_prefixed<'a, O, P>(p: P) -> impl Parser<&'a [u8], O, ContextError>
where
    P: Parser<&'a [u8], O, ContextError>,
{
    preceded(white_space_or_comment, p)
}

/// Number token: integer unless the text carries a decimal point or
/// exponent. The whole regular-byte run must parse, `10A` is a name.
pub fn int_or_float(input: &mut &[u8]) -> PResult<Either<i64, f64>> {
    take_while(1.., is_regular)
        .verify_map(|text: &[u8]| {
            let s = std::str::from_utf8(text).ok()?;
            if !s.bytes().any(|b| b.is_ascii_digit()) {
                return None;
            }
            if s.contains(['.', 'e', 'E']) {
                s.parse::<f64>().ok().map(Either::Right)
            } else {
                s.parse::<i64>()
                    .ok()
                    .map(Either::Left)
                    .or_else(|| s.parse::<f64>().ok().map(Either::Right))
            }
        })
        .parse_next(input)
}

/// `(...)` string body with balanced nested parentheses. Escapes are
/// decoded in place, octal escapes truncate to a byte, an escaped line
/// ending disappears.
pub fn string_literal(input: &mut &[u8]) -> PResult<Vec<u8>> {
    b'('.parse_next(input)?;
    let mut r = Vec::new();
    let mut depth = 1usize;
    loop {
        let b = any.parse_next(input)?;
        match b {
            b'(' => {
                depth += 1;
                r.push(b);
            }
            b')' => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
                r.push(b);
            }
            b'\\' => {
                let e = any.parse_next(input)?;
                match e {
                    b'n' => r.push(b'\n'),
                    b'r' => r.push(b'\r'),
                    b't' => r.push(b'\t'),
                    b'b' => r.push(0x08),
                    b'f' => r.push(0x0c),
                    b'(' | b')' | b'\\' => r.push(e),
                    b'\n' => {}
                    b'\r' => {
                        opt(b'\n').void().parse_next(input)?;
                    }
                    b'0'..=b'7' => {
                        let mut v = u32::from(e - b'0');
                        for _ in 0..2 {
                            match opt(one_of(b'0'..=b'7')).parse_next(input)? {
                                Some(d) => v = v * 8 + u32::from(d - b'0'),
                                None => break,
                            }
                        }
                        r.push(v as u8);
                    }
                    _ => r.push(e),
                }
            }
            _ => r.push(b),
        }
    }
    Ok(r)
}

/// `/Name` literal. The leading slash stays in the value; key-consuming
/// operators strip it when the name is used as a dictionary key.
pub fn literal_name(input: &mut &[u8]) -> PResult<Name> {
    (b'/', take_while(0.., is_regular))
        .recognize()
        .try_map(std::str::from_utf8)
        .map(name)
        .parse_next(input)
}

pub fn executable_name(input: &mut &[u8]) -> PResult<Name> {
    take_while(1.., is_regular)
        .try_map(std::str::from_utf8)
        .map(name)
        .parse_next(input)
}

/// `{ ... }` procedure body, tokenized recursively but not evaluated.
pub fn procedure(input: &mut &[u8]) -> PResult<TokenArray> {
    let body = repeat(0.., ws_prefixed(token));
    let mut p = (b'{', body, ws_prefixed(b'}')).map(|(_, body, _)| body);
    p.parse_next(input)
}

/// Array and dictionary delimiters execute as mark operators.
fn mark_name(input: &mut &[u8]) -> PResult<Token> {
    alt((
        b"<<".as_slice().value(Token::Name(sname("<<"))),
        b">>".as_slice().value(Token::Name(sname(">>"))),
        b'['.value(Token::Name(sname("["))),
        b']'.value(Token::Name(sname("]"))),
    ))
    .parse_next(input)
}

pub fn token(input: &mut &[u8]) -> PResult<Token> {
    alt((
        string_literal.map(|s| Token::Literal(s.into())),
        procedure.map(|t| Token::Literal(t.into())),
        literal_name.map(|n| Token::Literal(Value::Name(n))),
        mark_name,
        int_or_float.map(|v| match v {
            Either::Left(i) => Token::Literal(Value::Integer(i)),
            Either::Right(r) => Token::Literal(Value::Real(r)),
        }),
        executable_name.map(Token::Name),
    ))
    .parse_next(input)
}

#[cfg(test)]
mod tests;
