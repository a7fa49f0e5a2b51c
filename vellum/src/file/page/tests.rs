use super::*;
use crate::{
    file::Document,
    object::Object,
    testing::{zlib_compress, DocBuilder},
};
use std::num::NonZeroU32;
use test_log::test;

#[test]
fn rectangle_reorders_corners() {
    let r = Rectangle::from_lbrt(10., 20., 0., 0.);
    assert_eq!(r, Rectangle::from_lbrt(0., 0., 10., 20.));
    assert_eq!(r.width(), 10.);
    assert_eq!(r.height(), 20.);
}

#[test]
fn rectangle_from_object() {
    let o = Object::Array(vec![
        Object::Integer(0),
        Object::Integer(0),
        Object::Integer(612),
        Object::Number(792.5),
    ]);
    let r = Rectangle::try_from(&o).unwrap();
    assert_eq!(r.right_x, 612.);
    assert_eq!(r.upper_y, 792.5);
}

fn two_page_doc() -> Vec<u8> {
    let mut b = DocBuilder::new();
    b.add_object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    b.add_object(
        2,
        "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 /MediaBox [0 0 612 792] \
         /Resources << /Kind (inherited) >> >>",
    );
    b.add_object(3, "<< /Type /Page /Parent 2 0 R /Contents 5 0 R >>");
    b.add_object(
        4,
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 100 100] >>",
    );
    b.add_stream_object(5, "", b"0 0 moveto");
    b.finish_classic(1)
}

#[test]
fn walk_collects_leaves_in_order() {
    let doc = Document::parse(two_page_doc()).unwrap();
    let resolver = doc.resolver();
    let pages = doc.catalog(&resolver).unwrap().pages().unwrap();
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].id().map(|i| i.get()), Some(3));
    assert_eq!(pages[1].id().map(|i| i.get()), Some(4));
}

#[test]
fn media_box_inherited_and_overridden() {
    let doc = Document::parse(two_page_doc()).unwrap();
    let resolver = doc.resolver();
    let pages = doc.catalog(&resolver).unwrap().pages().unwrap();
    // page 1 inherits from the pages node
    assert_eq!(
        pages[0].media_box().unwrap().unwrap(),
        Rectangle::from_lbrt(0., 0., 612., 792.)
    );
    // page 2 declares its own
    assert_eq!(
        pages[1].media_box().unwrap().unwrap(),
        Rectangle::from_lbrt(0., 0., 100., 100.)
    );
}

#[test]
fn resources_inherited() {
    let doc = Document::parse(two_page_doc()).unwrap();
    let resolver = doc.resolver();
    let pages = doc.catalog(&resolver).unwrap().pages().unwrap();
    let res = pages[0].resources().unwrap().unwrap();
    assert!(res.contains_key("Kind"));
}

#[test]
fn content_single_stream() {
    let doc = Document::parse(two_page_doc()).unwrap();
    let resolver = doc.resolver();
    let pages = doc.catalog(&resolver).unwrap().pages().unwrap();
    let content = pages[0].content().unwrap();
    assert_eq!(content.iter().collect::<Vec<_>>(), vec![b"0 0 moveto".as_slice()]);
    assert!(pages[1].content().unwrap().is_empty());
}

#[test]
fn content_stream_array_concatenates_in_order() {
    let mut b = DocBuilder::new();
    b.add_object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    b.add_object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
    b.add_object(3, "<< /Type /Page /Contents [4 0 R 5 0 R] >>");
    b.add_stream_object(4, "", b"first");
    b.add_stream_object(5, "", b"second");
    let doc = Document::parse(b.finish_classic(1)).unwrap();
    let resolver = doc.resolver();
    let pages = doc.catalog(&resolver).unwrap().pages().unwrap();
    let content = pages[0].content().unwrap();
    assert_eq!(
        content.iter().collect::<Vec<_>>(),
        vec![b"first".as_slice(), b"second".as_slice()]
    );
}

#[test]
fn compressed_content_stream() {
    let compressed = zlib_compress(b"10 10 moveto");
    let mut b = DocBuilder::new();
    b.add_object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    b.add_object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
    b.add_object(3, "<< /Type /Page /Contents 4 0 R >>");
    b.add_stream_object(4, "/Filter /FlateDecode", &compressed);
    let doc = Document::parse(b.finish_classic(1)).unwrap();
    let resolver = doc.resolver();
    let pages = doc.catalog(&resolver).unwrap().pages().unwrap();
    let content = pages[0].content().unwrap();
    assert_eq!(content.iter().collect::<Vec<_>>(), vec![b"10 10 moveto".as_slice()]);
}

#[test]
fn page_tree_cycle_guard() {
    // pages node lists itself as a kid
    let mut b = DocBuilder::new();
    b.add_object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    b.add_object(2, "<< /Type /Pages /Kids [2 0 R 3 0 R] /Count 1 >>");
    b.add_object(3, "<< /Type /Page /Parent 2 0 R >>");
    let doc = Document::parse(b.finish_classic(1)).unwrap();
    let resolver = doc.resolver();
    let pages = doc.catalog(&resolver).unwrap().pages().unwrap();
    // the self reference is skipped, the real leaf still found
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].id(), NonZeroU32::new(3));
}

#[test]
fn nested_pages_nodes() {
    let mut b = DocBuilder::new();
    b.add_object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    b.add_object(2, "<< /Type /Pages /Kids [3 0 R] /Count 2 >>");
    b.add_object(3, "<< /Type /Pages /Kids [4 0 R 5 0 R] /Count 2 >>");
    b.add_object(4, "<< /Type /Page >>");
    b.add_object(5, "<< /Type /Page >>");
    let doc = Document::parse(b.finish_classic(1)).unwrap();
    let resolver = doc.resolver();
    let pages = doc.catalog(&resolver).unwrap().pages().unwrap();
    assert_eq!(pages.len(), 2);
}
