use super::*;
use crate::object::HexString;
use inkscript::name;
use test_case::test_case;

macro_rules! name {
    ($s:literal) => {
        Object::Name(name($s))
    };
}

#[test_case(Object::Null, "null"; "null")]
#[test_case(true, "true")]
#[test_case(false, "false")]
#[test_case(123, "123"; "integer")]
#[test_case(-123, "-123"; "negative integer")]
#[test_case(123, "+123"; "integer prefixed with plus")]
#[test_case(123.12, "123.12"; "number")]
#[test_case(-123.12, "-123.12"; "negative number")]
#[test_case(4.0, "4.0"; "number end with dot")]
#[test_case(-0.002, "-.002"; "number start with dot")]
#[test_case(4294967296f32, "4294967296"; "integer out of i32 range")]
#[test_case(Object::from("()"), "()"; "empty literal string")]
#[test_case(Object::from("(5\\()"), "(5\\()"; "escaped paren")]
#[test_case(Object::from("(a(foo))"), "(a(foo))"; "nested quoted string")]
#[test_case(Object::from("(a\nb)"), "(a\nb)"; "string with new line")]
#[test_case(HexString::new(b"<>"), "<>")]
#[test_case(HexString::new(b"<12A>"), "<12A>")]
#[test_case(HexString::new(b"<12 A\t3>"), "<12 A\t3>"; "hex with whitespace")]
#[test_case(name!(""), "/"; "empty name")]
#[test_case(name!("foo"), "/foo"; "name")]
fn test_parse_simple_objects(exp: impl Into<Object>, buf: &'static str) {
    let o = parse_object(buf.as_bytes()).unwrap();
    assert_eq!((b"".as_slice(), exp.into()), o);
}

#[test_case(vec![], "[]"; "empty array")]
#[test_case(vec![], "[ \t]"; "empty array with whitespace")]
#[test_case(vec![Object::Null], "[null]"; "array with null")]
#[test_case(vec![Object::Array(vec![Object::Null])], "[[null]]"; "nested array")]
#[test_case(vec![name!("foo")], "[/foo]"; "name value")]
#[test_case(vec![Object::Integer(1), Object::Integer(2)], "[1 2]"; "numbers")]
#[test_case(vec![Object::new_ref(1), Object::Integer(2)], "[1 0 R 2]"; "reference then number")]
fn test_parse_array(exp: Vec<Object>, buf: &'static str) {
    assert_eq!(
        (b"".as_slice(), exp.into()),
        parse_array(buf.as_bytes()).unwrap()
    );
}

#[test]
fn test_parse_dict() {
    let (remains, d) = parse_dict(b"<< /Type /Catalog /Pages 2 0 R /N 5 >>").unwrap();
    assert!(remains.is_empty());
    assert_eq!(d.get("Type").unwrap(), &name!("Catalog"));
    assert_eq!(d.get("Pages").unwrap(), &Object::new_ref(2));
    assert_eq!(d.get("N").unwrap(), &Object::Integer(5));
}

#[test_case(b"<< >>", 0; "empty dict")]
#[test_case(b"<<>>", 0; "empty dict no spaces")]
#[test_case(b"<</Inner<<>>>>", 1; "nested dict")]
#[test_case(b"<</id[]>>", 1; "empty array value")]
#[test_case(b"<</id()>>", 1; "string value")]
#[test_case(b"<</id/Value>>", 1; "name value")]
fn test_parse_dict_shapes(buf: impl AsRef<[u8]>, entries: usize) {
    let (remains, d) = parse_dict(buf.as_ref()).unwrap();
    assert!(remains.is_empty());
    assert_eq!(entries, d.len());
}

#[test]
fn test_parse_indirect_object() {
    let (remains, o) = parse_indirect_object(b"1 0 obj\nnull\nendobj").unwrap();
    assert!(remains.is_empty());
    assert_eq!(1u32, o.id().id().get());
    assert_eq!(0, o.id().generation());
    assert_eq!(&Object::Null, o.object());
}

#[test]
fn test_parse_reference() {
    let (remains, r) = parse_reference(b"1 0 R").unwrap();
    assert!(remains.is_empty());
    assert_eq!(r, Reference::new_u32(1, 0));
}

#[test]
fn reference_not_confused_with_rg_operator() {
    // `0 1 0 RG` is a graphics operation, not Integer + Reference
    assert!(parse_reference(b"1 0 RG").is_err());
}

#[test_case("foo", b"/foo")]
#[test_case("a#b", b"/a#23b")]
#[test_case("Ab", b"/#41#62")]
fn name_normalize(exp: impl AsRef<str>, name: impl AsRef<[u8]>) {
    assert_eq!(normalize_name(name.as_ref()).unwrap(), exp.as_ref());
}

#[test]
fn test_parse_object_and_stream() {
    // length is int: data skipped exactly
    let buf = b"<</Length 4>>\nstream\n1234\nendstream\n";
    let (input, o) = parse_object_and_stream(buf).unwrap();
    assert_eq!(input, b"\n");
    let (_, start, length) = o.right().unwrap();
    assert_eq!(21, start);
    assert_eq!(NonZeroU32::new(4), length);
    assert_eq!(b"1234", &buf[start as usize..start as usize + 4]);

    // length is a reference: span left open for the resolver
    let buf = b"<</Length 1 0 R>>\nstream\nblah\nendstream\n";
    let (input, o) = parse_object_and_stream(buf).unwrap();
    assert_eq!(input[0], b'b');
    let (_, start, length) = o.right().unwrap();
    assert_eq!(25, start);
    assert_eq!(None, length);

    // endstream preceded by cr only
    let buf = b"<</Length 4>>\nstream\n1234\rendstream\n";
    let (input, o) = parse_object_and_stream(buf).unwrap();
    assert_eq!(input, b"\n");
    let (_, _, length) = o.right().unwrap();
    assert_eq!(NonZeroU32::new(4), length);

    // stream content containing the endstream keyword is not scanned
    let buf = b"<</Length 14>>\nstream\nab endstream x\nendstream\n";
    let (input, o) = parse_object_and_stream(buf).unwrap();
    assert_eq!(input, b"\n");
    let (_, start, length) = o.right().unwrap();
    assert_eq!(NonZeroU32::new(14), length);
    assert_eq!(
        b"ab endstream x",
        &buf[start as usize..(start as usize + 14)]
    );

    // no stream keyword: plain dictionary
    let buf = b"<</N 1>> tail";
    let (_, o) = parse_object_and_stream(buf).unwrap();
    assert!(o.left().unwrap().as_dict().is_ok());
}

#[test]
fn parse_indirect_stream_buf_pos() {
    let buf = b"5 0 obj\n<</Length 3>>\nstream\nxyz\nendstream\nendobj\n";
    let (_, stream) = parse_indirect_stream(buf).unwrap();
    let pos = stream.buf_pos();
    assert_eq!(
        b"xyz",
        &buf[pos.start() as usize..pos.start() as usize + 3]
    );
}
