use super::*;
use crate::object::Object;
use test_case::test_case;
use test_log::test;

#[test]
fn parse_file_header() {
    let buf = b"%PDF-1.7\n%comment\n";
    let (buf, header) = parse_header(buf).unwrap();
    assert_eq!(buf, b"");
    assert_eq!(header, "1.7");
}

#[test]
fn header_rejects_unknown_major() {
    assert!(parse_header(b"%PDF-9.9\n").is_err());
    assert!(parse_header(b"not a document").is_err());
}

#[test_case(None, b"hello", b"world"; "not exist")]
#[test_case(Some(0), b"hello", b"hello"; "matches")]
#[test_case(Some(1), b"\nhello", b"hello"; "after newline")]
#[test_case(Some(1), b"\nhello\n", b"hello"; "end with newline")]
#[test_case(Some(2), b"\r\nhello\r\n", b"hello"; "crlf")]
#[test_case(Some(4), b"foo\nfoo\nbar", b"foo"; "from end")]
#[test_case(None, b"abc-foo", b"foo"; "not the whole line")]
fn test_r_find_start_object_tag(exp: Option<usize>, buf: &[u8], tag: &[u8]) {
    assert_eq!(exp, r_find_start_object_tag(buf, tag));
}

#[test]
fn test_parse_trailer() {
    let buf = b"trailer\n<< /Size 1 >>\nstartxref\n1234\n%%EOF";
    let (_, trailer) = parse_trailer(buf).unwrap();
    assert_eq!(trailer.get("Size"), Some(&Object::Integer(1)));
}

#[test]
fn test_parse_xref_table() {
    let (_, section) = parse_xref_table(b"xref\n1 0\n").unwrap();
    assert!(section.is_empty());

    let (_, section) =
        parse_xref_table(b"xref\n1 2\n0000000000 00000 n \n0000000010 00000 n \n").unwrap();
    assert_eq!(
        section,
        vec![
            (1, Entry::in_file(0, 0, true)),
            (2, Entry::in_file(10, 0, true)),
        ]
    );
}

#[test]
fn xref_table_free_entries() {
    let (_, section) =
        parse_xref_table(b"xref\n0 2\n0000000000 65535 f \n0000000018 00000 n \n").unwrap();
    assert_eq!(
        section,
        vec![
            (0, Entry::in_file(0, 65535, false)),
            (1, Entry::in_file(18, 0, true)),
        ]
    );
}

#[test]
fn test_parse_frame() {
    let (_, (trailer, section)) = parse_frame(
        b"xref
1 2
0000000000 00000 n
0000000010 00000 n
trailer
<< /Size 1 >>
startxref
1234
%%EOF
",
    )
    .unwrap();
    assert_eq!(trailer.get("Size"), Some(&Object::Integer(1)));
    assert_eq!(section.len(), 2);
}

#[test]
fn test_parse_frame_set() {
    let (_, frames) = parse_frame_set(
        b"%PDF-1.7
xref
1 1
0000000000 00000 n
trailer
<< /Size 1 >>
startxref
9
%%EOF
xref
1 1
0000000000 00000 n
trailer
<< /Prev 9 >>
startxref
77
%%EOF
",
    )
    .unwrap();
    assert_eq!(2, frames.len());
    // startxref frame first, then the /Prev chain
    assert_eq!(77, frames[0].xref_pos);
    assert_eq!(9, frames[1].xref_pos);
}

#[test]
fn xref_stream_round_trip() {
    use crate::testing::DocBuilder;

    let mut b = DocBuilder::new();
    b.add_object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    b.add_object(2, "<< /Type /Pages /Kids [] /Count 0 >>");
    let offset1 = b.offset_of(1);
    let offset2 = b.offset_of(2);
    let buf = b.finish_xref_stream(1);

    let (_, frames) = parse_frame_set(&buf).unwrap();
    assert_eq!(1, frames.len());
    let section = &frames[0].xref_section;
    assert!(section.contains(&(1, Entry::in_file(offset1, 0, true))));
    assert!(section.contains(&(2, Entry::in_file(offset2, 0, true))));
    assert!(section.contains(&(0, Entry::in_file(0, 0xff, false))));
    assert_eq!(
        frames[0].trailer.get("Root"),
        Some(&Object::new_ref(1))
    );
}

#[test]
fn xref_stream_same_offsets_as_classic() {
    use crate::testing::DocBuilder;

    fn build(classic: bool) -> (Vec<u8>, Vec<(u32, u32)>) {
        let mut b = DocBuilder::new();
        b.add_object(1, "<< /Type /Catalog /Pages 2 0 R >>");
        b.add_object(2, "<< /Type /Pages /Kids [] /Count 0 >>");
        b.add_object(3, "(some text)");
        let offsets = (1..=3).map(|id| (id, b.offset_of(id))).collect();
        let buf = if classic {
            b.finish_classic(1)
        } else {
            b.finish_xref_stream(1)
        };
        (buf, offsets)
    }

    let (classic_buf, classic_offsets) = build(true);
    let (stream_buf, stream_offsets) = build(false);
    assert_eq!(classic_offsets, stream_offsets);

    let (_, classic_frames) = parse_frame_set(&classic_buf).unwrap();
    let (_, stream_frames) = parse_frame_set(&stream_buf).unwrap();
    for (id, offset) in classic_offsets {
        let exp = Entry::in_file(offset, 0, true);
        assert!(classic_frames[0].xref_section.contains(&(id, exp)));
        assert!(stream_frames[0].xref_section.contains(&(id, exp)));
    }
}
