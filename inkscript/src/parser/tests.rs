use super::*;
use crate::machine::name_token;
use either::{Left, Right};
use test_case::test_case;

macro_rules! tokens {
    () => {
        TokenArray::new()
    };
    ($($e:expr),*) => {
        vec![$(Into::<Token>::into($e)),*]
    }
}

#[test]
fn test_comment() {
    (comment, b'\n').parse(b"% comment\n").unwrap();
    (comment, b'\n').parse(b"%\n").unwrap();
    (comment, b"\r\n".as_slice()).parse(b"%\r\n").unwrap();
}

#[test_case(b"1" => Left(1))]
#[test_case(b"123" => Left(123))]
#[test_case(b"-98" => Left(-98))]
#[test_case(b"0" => Left(0))]
#[test_case(b"+17" => Left(17))]
#[test_case(b"-.002" => Right(-0.002))]
#[test_case(b"34.5" => Right(34.5))]
#[test_case(b"-3.62" => Right(-3.62))]
#[test_case(b"123.6e10" => Right(123.6e10))]
#[test_case(b"-1." => Right(-1.))]
#[test_case(b"0.0" => Right(0.0))]
#[test_case(b"2e-6" => Right(2e-6))]
fn test_int_or_float(buf: &[u8]) -> Either<i64, f64> {
    int_or_float.parse(buf).unwrap()
}

#[test_case(b"()" => &b""[..]; "empty")]
#[test_case(b"(foo)" => &b"foo"[..])]
#[test_case(b"(foo
new line)" => &b"foo\nnew line"[..])]
#[test_case(b"((a()))" => &b"(a())"[..]; "nested balanced")]
#[test_case(br"(\n\t)" => &b"\n\t"[..]; "escapes")]
#[test_case(br"(\(\))" => &b"()"[..]; "escaped parens")]
#[test_case(br"(\0a)" => &b"\0a"[..]; "oct esc 1 digit")]
#[test_case(br"(\10a)" => &b"\x08a"[..]; "oct esc 2 digits")]
#[test_case(br"(\101)" => &b"A"[..]; "oct esc 3 digits")]
#[test_case(br"(\700a)" => &b"\xc0a"[..]; "oct overflow truncates")]
#[test_case(b"(a\\\nb)" => &b"ab"[..]; "escaped line end")]
fn test_string(buf: &[u8]) -> Vec<u8> {
    string_literal.parse(buf).unwrap()
}

#[test_case("abc" => "abc")]
#[test_case("$$" => "$$")]
#[test_case("@pattern" => "@pattern")]
fn test_executable_name(buf: &str) -> String {
    executable_name.parse(buf.as_bytes()).unwrap().to_string()
}

#[test_case("/" => "/"; "empty")]
#[test_case("/Na$1" => "/Na$1")]
fn test_literal_name(buf: &str) -> String {
    literal_name.parse(buf.as_bytes()).unwrap().to_string()
}

#[test_case("{}" => tokens![]; "empty")]
#[test_case("{ { } }" => tokens![tokens![]]; "nested empty")]
#[test_case("{ 10 1.5 ($) [ /foo ] }" => tokens![10i64, 1.5, *b"$", name_token("["), "/foo", name_token("]")]; "values")]
fn test_procedure(buf: &str) -> TokenArray {
    procedure.parse(buf.as_bytes()).unwrap()
}

#[test_case("10", 10i64)]
#[test_case("10A", name_token("10A"))]
#[test_case("true", name_token("true"); "true is executable")]
#[test_case("<<", name_token("<<"))]
#[test_case(">>", name_token(">>"))]
#[test_case("[", name_token("["))]
#[test_case("]", name_token("]"))]
fn test_token(buf: &str, exp: impl Into<Token>) {
    assert_eq!(exp.into(), token.parse(buf.as_bytes()).unwrap());
}

#[test]
fn ws_prefixed_skips_comments() {
    let mut input = b"  % note\n 42 rest".as_slice();
    let t = ws_prefixed(token).parse_next(&mut input).unwrap();
    assert_eq!(t, Token::Literal(Value::Integer(42)));
    assert_eq!(input, b" rest");
}

/// Tokenizing the text a value displays as yields the value back.
#[test_case("42")]
#[test_case("-7")]
#[test_case("2.5")]
#[test_case("/name")]
#[test_case("(text)")]
fn display_round_trip(src: &str) {
    let t = token.parse(src.as_bytes()).unwrap();
    let Token::Literal(v) = &t else {
        panic!("literal expected");
    };
    let t2 = token.parse(v.to_string().as_bytes()).unwrap();
    assert_eq!(&t, &t2);
}
