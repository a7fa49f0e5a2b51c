//! In-memory document fixtures for tests. Offsets are recorded while
//! the buffer is assembled, so xref tables always agree with the body.

use flate2::{write::ZlibEncoder, Compression};
use std::io::Write;

pub struct DocBuilder {
    buf: Vec<u8>,
    /// (id, offset) in insertion order, ids contiguous from 1
    objects: Vec<(u32, u32)>,
}

impl DocBuilder {
    pub fn new() -> Self {
        Self {
            buf: b"%PDF-1.7\n".to_vec(),
            objects: Vec::new(),
        }
    }

    pub fn offset_of(&self, id: u32) -> u32 {
        self.objects
            .iter()
            .find(|(i, _)| *i == id)
            .map(|(_, o)| *o)
            .unwrap()
    }

    pub fn add_object(&mut self, id: u32, body: &str) -> &mut Self {
        self.objects.push((id, self.buf.len() as u32));
        self.buf
            .extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", id, body).as_bytes());
        self
    }

    pub fn add_stream_object(&mut self, id: u32, dict_entries: &str, data: &[u8]) -> &mut Self {
        self.objects.push((id, self.buf.len() as u32));
        self.buf.extend_from_slice(
            format!(
                "{} 0 obj\n<< /Length {} {} >>\nstream\n",
                id,
                data.len(),
                dict_entries
            )
            .as_bytes(),
        );
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\nendstream\nendobj\n");
        self
    }

    /// Finish with a classic textual xref table.
    pub fn finish_classic(mut self, root: u32) -> Vec<u8> {
        let xref_pos = self.buf.len();
        let size = self.objects.len() + 1;
        self.buf
            .extend_from_slice(format!("xref\n0 {}\n", size).as_bytes());
        self.buf.extend_from_slice(b"0000000000 65535 f \n");
        let mut objects = self.objects.clone();
        objects.sort_by_key(|(id, _)| *id);
        for (_, offset) in &objects {
            self.buf
                .extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        self.buf.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root {} 0 R >>\nstartxref\n{}\n%%EOF\n",
                size, root, xref_pos
            )
            .as_bytes(),
        );
        self.buf
    }

    /// Finish with a `/Type /XRef` stream, `/W [1 3 1]`, FlateDecode.
    pub fn finish_xref_stream(mut self, root: u32) -> Vec<u8> {
        let xref_id = self.objects.iter().map(|(id, _)| *id).max().unwrap_or(0) + 1;
        let xref_pos = self.buf.len() as u32;
        let size = xref_id + 1;

        let mut entries = Vec::new();
        // id 0: free
        entries.extend_from_slice(&[0, 0, 0, 0, 0xff]);
        let mut objects = self.objects.clone();
        objects.sort_by_key(|(id, _)| *id);
        for (_, offset) in &objects {
            entries.push(1);
            entries.extend_from_slice(&offset.to_be_bytes()[1..]);
            entries.push(0);
        }
        // the xref stream object itself
        entries.push(1);
        entries.extend_from_slice(&xref_pos.to_be_bytes()[1..]);
        entries.push(0);

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&entries).unwrap();
        let data = encoder.finish().unwrap();

        self.buf.extend_from_slice(
            format!(
                "{} 0 obj\n<< /Type /XRef /Size {} /W [1 3 1] /Filter /FlateDecode \
                 /Root {} 0 R /Length {} >>\nstream\n",
                xref_id,
                size,
                root,
                data.len()
            )
            .as_bytes(),
        );
        self.buf.extend_from_slice(&data);
        self.buf.extend_from_slice(b"\nendstream\nendobj\n");
        self.buf
            .extend_from_slice(format!("startxref\n{}\n%%EOF\n", xref_pos).as_bytes());
        self.buf
    }
}

/// One page document whose single content stream is `content`.
pub fn single_page_doc(content: &str) -> Vec<u8> {
    let mut b = DocBuilder::new();
    b.add_object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    b.add_object(
        2,
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
    );
    b.add_object(
        3,
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R >>",
    );
    b.add_stream_object(4, "", content.as_bytes());
    b.finish_classic(1)
}

/// Deflate `data` with zlib headers, as `/FlateDecode` expects.
pub fn zlib_compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}
