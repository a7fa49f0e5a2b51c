//! Types of the document file structure.

use crate::{
    object::{Dictionary, FrameSet, Object, ObjectValueError, Stream, XRefEntry as Entry},
    parser::{
        error_offset, parse_frame_set, parse_header, parse_indirect_object, parse_object,
        ParseResult,
    },
};
use ahash::{HashMap, HashMapExt};
use anyhow::Result as AnyResult;
use either::Either;
use inkscript::Name;
use log::warn;
use nom::Finish;
use once_cell::unsync::OnceCell;
use std::{iter::repeat_with, num::NonZeroU32, path::Path, rc::Rc};

mod page;
pub use page::*;

#[derive(Debug, Copy, Clone)]
pub enum ObjectPos {
    Offset(u32),
    InStream(NonZeroU32, u16),
}

impl<'a> From<&'a Entry> for ObjectPos {
    fn from(e: &'a Entry) -> Self {
        match e {
            Entry::InFile(pos) => ObjectPos::Offset(pos.offset()),
            Entry::InStream(id, idx) => ObjectPos::InStream(*id, *idx),
        }
    }
}

type IDOffsetMap = HashMap<u32, ObjectPos>;

/// Object stream packs several non-stream objects into one stream.
/// The decoded body starts with `N` pairs of `id offset`, offsets are
/// relative to `/First`.
#[derive(Debug)]
struct ObjectStream {
    buf: Vec<u8>,
    first: usize,
    /// (id, offset) pairs in declaration order
    offsets: Vec<(u32, u32)>,
}

fn parse_object_stream_index(n: usize, buf: &[u8]) -> ParseResult<Vec<(u32, u32)>> {
    use nom::{
        character::complete::{space0, space1, u32},
        multi::count,
        sequence::{separated_pair, terminated},
    };

    count(
        terminated(separated_pair(u32, space1, u32), space0),
        n,
    )(buf)
}

impl ObjectStream {
    pub fn new(stream: &Stream, file: &[u8]) -> Result<Self, ObjectValueError> {
        let d = stream.as_dict();
        if d.type_name().map(|n| n.as_str()) != Some("ObjStm") {
            return Err(ObjectValueError::UnexpectedType);
        }
        let n = d.get_int("N", 0)? as usize;
        let first = d.get_int("First", 0)? as usize;
        let buf = stream.decode_without_resolve_length(file)?;
        let offsets = parse_object_stream_index(n, buf.as_ref())
            .map_err(|e| ObjectValueError::ParseError(0, format!("{:?}", e)))
            .map(|(_, r)| r)?;
        Ok(Self {
            buf: buf.into_owned(),
            first,
            offsets,
        })
    }

    /// Buffer holding the `idx`-th packed object.
    pub fn get_buf(&self, idx: usize) -> Option<&[u8]> {
        let (_, offset) = self.offsets.get(idx)?;
        let start = self.first + *offset as usize;
        let end = self
            .offsets
            .get(idx + 1)
            .map_or(self.buf.len(), |(_, o)| self.first + *o as usize);
        self.buf.get(start..end)
    }
}

#[derive(Debug)]
pub struct XRefTable {
    // object id -> position
    id_offset: IDOffsetMap,
    // stream object id -> lazily decoded ObjectStream
    object_streams: HashMap<NonZeroU32, OnceCell<ObjectStream>>,
}

impl XRefTable {
    pub fn new(id_offset: IDOffsetMap) -> Self {
        let object_streams = id_offset
            .values()
            .filter_map(|e| {
                if let ObjectPos::InStream(id, _) = e {
                    Some(*id)
                } else {
                    None
                }
            })
            .zip(repeat_with(OnceCell::new))
            .collect();

        Self {
            id_offset,
            object_streams,
        }
    }

    #[cfg(test)]
    pub fn empty() -> Self {
        Self {
            id_offset: IDOffsetMap::new(),
            object_streams: HashMap::new(),
        }
    }

    /// Scan `IDOffsetMap` by indirect object declarations, to create
    /// file objects for testing without an xref table.
    #[cfg(test)]
    pub fn from_buf(buf: &[u8]) -> Self {
        use crate::parser::ws_prefixed;
        use nom::multi::many1;

        let (_, objects) = many1(ws_prefixed(parse_indirect_object))(buf).unwrap();
        let mut id_offset = IDOffsetMap::new();
        for o in objects {
            let search_key = format!("{} {} obj", o.id().id(), o.id().generation());
            let pos = buf
                .windows(search_key.len())
                .position(|w| w == search_key.as_bytes())
                .unwrap() as u32;
            id_offset.insert(o.id().id().get(), ObjectPos::Offset(pos));
        }

        Self::new(id_offset)
    }

    /// Merge a frame set newest first: the latest in-use entry wins,
    /// later free entries remove earlier definitions.
    fn scan(frame_set: &FrameSet) -> IDOffsetMap {
        let mut r = IDOffsetMap::with_capacity(5000);
        for (id, entry) in frame_set.iter().rev().flat_map(|f| f.xref_section.iter()) {
            if entry.is_used() {
                r.insert(*id, entry.into());
            } else if *id != 0 {
                r.remove(id);
            }
        }
        r
    }

    pub fn from_frame_set(frame_set: &FrameSet) -> Self {
        Self::new(Self::scan(frame_set))
    }

    fn object_stream(
        &self,
        buf: &[u8],
        id: NonZeroU32,
    ) -> Result<&ObjectStream, ObjectValueError> {
        self.object_streams
            .get(&id)
            .ok_or(ObjectValueError::ObjectIDNotFound(id.get()))?
            .get_or_try_init(|| {
                let stream_buf = self
                    .resolve_object_buf(buf, id)
                    .ok_or(ObjectValueError::ObjectIDNotFound(id.get()))?;
                let stream_buf = stream_buf.left().ok_or(ObjectValueError::UnexpectedType)?;
                let offset = buf.len() - stream_buf.len();
                let (_, o) = parse_indirect_object(stream_buf)
                    .finish()
                    .map_err(|e| ObjectValueError::ParseError(offset, format!("{:?}", e)))?;
                let Object::Stream(s) = o.take() else {
                    return Err(ObjectValueError::UnexpectedType);
                };
                let s = Rc::into_inner(s).unwrap().rebase(offset as u32);
                ObjectStream::new(&s, buf)
            })
    }

    /// Return `buf` start from where `id` is, or the packed body inside
    /// its object stream.
    fn resolve_object_buf<'a, 'b>(
        &'b self,
        buf: &'a [u8],
        id: NonZeroU32,
    ) -> Option<Either<&'a [u8], &'b [u8]>> {
        match self.id_offset.get(&id.get())? {
            ObjectPos::Offset(offset) => buf.get(*offset as usize..).map(Either::Left),
            ObjectPos::InStream(stream_id, idx) => {
                let object_stream = self.object_stream(buf, *stream_id).ok()?;
                object_stream.get_buf(*idx as usize).map(Either::Right)
            }
        }
    }

    pub fn parse_object(
        &self,
        buf: &[u8],
        id: NonZeroU32,
    ) -> Result<Object, ObjectValueError> {
        self.resolve_object_buf(buf, id)
            .ok_or(ObjectValueError::ObjectIDNotFound(id.get()))
            .and_then(|slice| {
                slice.either(
                    |object_buf| {
                        let offset = buf.len() - object_buf.len();
                        parse_indirect_object(object_buf)
                            .finish()
                            .map(|(_, o)| match o.take() {
                                // stream spans index the whole file buffer
                                Object::Stream(s) => match Rc::try_unwrap(s) {
                                    Ok(s) => Object::Stream(Rc::new(s.rebase(offset as u32))),
                                    Err(s) => Object::Stream(s),
                                },
                                o => o,
                            })
                            .map_err(|e| {
                                ObjectValueError::ParseError(offset, format!("{:?}", e))
                            })
                    },
                    |packed_buf| {
                        parse_object(packed_buf)
                            .finish()
                            .map(|(_, o)| o)
                            .map_err(|e| ObjectValueError::ParseError(0, format!("{:?}", e)))
                    },
                )
            })
    }

    pub fn iter_ids(&self) -> impl Iterator<Item = NonZeroU32> + '_ {
        self.id_offset.keys().map(|v| NonZeroU32::new(*v).unwrap())
    }

    pub fn count(&self) -> usize {
        self.id_offset.len()
    }
}

/// Lazily parses and caches objects addressed through the xref table.
/// References always resolve through here; a reference to an absent
/// object resolves to null.
#[derive(Debug)]
pub struct ObjectResolver<'a> {
    buf: &'a [u8],
    xref_table: &'a XRefTable,
    objects: HashMap<NonZeroU32, OnceCell<Object>>,
    null: Object,
}

impl<'a> ObjectResolver<'a> {
    pub fn new(buf: &'a [u8], xref_table: &'a XRefTable) -> Self {
        let mut objects = HashMap::with_capacity(xref_table.count());
        xref_table.iter_ids().for_each(|id| {
            objects.insert(id, OnceCell::new());
        });

        Self {
            buf,
            xref_table,
            objects,
            null: Object::Null,
        }
    }

    /// Total object count.
    pub fn n(&self) -> usize {
        self.objects.len()
    }

    #[cfg(test)]
    pub fn empty(xref_table: &'a XRefTable) -> Self {
        Self {
            buf: b"",
            xref_table,
            objects: HashMap::new(),
            null: Object::Null,
        }
    }

    #[cfg(test)]
    pub fn setup_object(&mut self, id: u32, v: Object) {
        self.objects
            .insert(NonZeroU32::new(id).unwrap(), OnceCell::with_value(v));
    }

    /// Resolve object by id. A reference chain resolves to its end
    /// value.
    pub fn resolve(&self, id: NonZeroU32) -> Result<&Object, ObjectValueError> {
        self.objects
            .get(&id)
            .ok_or(ObjectValueError::ObjectIDNotFound(id.get()))?
            .get_or_try_init(|| {
                let mut o = self.xref_table.parse_object(self.buf, id)?;
                while let Object::Reference(r) = o {
                    o = self.xref_table.parse_object(self.buf, r.id().id())?;
                }
                Ok(o)
            })
    }

    /// Like `resolve()`, but an absent object is null instead of an
    /// error.
    pub fn resolve_or_null(&self, id: NonZeroU32) -> Result<&Object, ObjectValueError> {
        match self.resolve(id) {
            Ok(o) => Ok(o),
            Err(ObjectValueError::ObjectIDNotFound(id)) => {
                warn!("reference to absent object {}, resolved to null", id);
                Ok(&self.null)
            }
            Err(e) => Err(e),
        }
    }

    /// Follow `v` if it is a reference, otherwise return it unchanged.
    pub fn resolve_reference<'b>(&'b self, v: &'b Object) -> Result<&'b Object, ObjectValueError> {
        if let Object::Reference(r) = v {
            self.resolve_or_null(r.id().id())
        } else {
            Ok(v)
        }
    }

    /// Get `key` from `d`, following a reference value.
    pub fn opt_dict_value<'b>(
        &'b self,
        d: &'b Dictionary,
        key: &str,
    ) -> Result<Option<&'b Object>, ObjectValueError> {
        d.get(key).map(|o| self.resolve_reference(o)).transpose()
    }

    /// Decoded data of the stream object `id`.
    pub fn stream_data(&self, id: NonZeroU32) -> Result<Vec<u8>, ObjectValueError> {
        let stream = self.resolve(id)?.as_stream()?;
        stream.decode(self.buf, self).map(|d| d.into_owned())
    }

    pub fn file_buf(&self) -> &'a [u8] {
        self.buf
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DocumentError {
    #[error("trailer has no root entry")]
    MissingRoot,
    #[error("structural error at byte {offset}: {message}")]
    Structural { offset: usize, message: String },
}

/// Document root: the catalog dictionary, entry into the page tree.
#[derive(Debug)]
pub struct Catalog<'a, 'b> {
    dict: &'b Dictionary,
    resolver: &'b ObjectResolver<'a>,
}

impl<'a, 'b: 'a> Catalog<'a, 'b> {
    fn parse(
        id: NonZeroU32,
        resolver: &'b ObjectResolver<'a>,
    ) -> Result<Self, ObjectValueError> {
        let dict = resolver.resolve(id)?.as_dict()?;
        if dict.type_name().map(|n| n.as_str()) != Some("Catalog") {
            warn!("root object is not typed /Catalog");
        }
        Ok(Self { dict, resolver })
    }

    pub fn ver(&self) -> Option<&Name> {
        self.dict.get_name("Version").ok().flatten()
    }

    /// Pages in document order.
    pub fn pages(&self) -> Result<Vec<Page<'a, 'b>>, ObjectValueError> {
        let pages_id = self
            .dict
            .get("Pages")
            .ok_or(ObjectValueError::DictKeyNotFound("Pages"))?
            .reference()?
            .id()
            .id();
        Page::parse(pages_id, self.resolver)
    }
}

/// Parsed document: raw bytes, xref table and the ids found in the
/// trailer.
pub struct Document {
    root_id: NonZeroU32,
    info_id: Option<NonZeroU32>,
    head_ver: String,
    trailer: Dictionary,
    data: Vec<u8>,
    xref: XRefTable,
}

impl Document {
    pub fn open(path: impl AsRef<Path>) -> AnyResult<Self> {
        let buf = std::fs::read(path)?;
        Self::parse(buf)
    }

    pub fn parse(buf: Vec<u8>) -> AnyResult<Self> {
        fn structural(buf: &[u8], e: nom::Err<crate::parser::ParseError>) -> DocumentError {
            let (offset, message) = match &e {
                nom::Err::Error(inner) | nom::Err::Failure(inner) => {
                    (error_offset(buf, inner), format!("{:?}", e))
                }
                nom::Err::Incomplete(_) => (buf.len(), "unexpected end of file".to_owned()),
            };
            DocumentError::Structural { offset, message }
        }

        let (_, head_ver) = parse_header(&buf).map_err(|e| structural(&buf, e))?;
        let head_ver = head_ver.to_owned();
        let (_, frame_set) = parse_frame_set(&buf).map_err(|e| structural(&buf, e))?;
        let xref = XRefTable::from_frame_set(&frame_set);

        let trailers: Vec<_> = frame_set.into_iter().map(|f| f.trailer).collect();
        let root_id = trailers
            .iter()
            .find_map(|t| t.get("Root"))
            .ok_or(DocumentError::MissingRoot)?
            .reference()
            .map_err(|_| DocumentError::MissingRoot)?
            .id()
            .id();
        let info_id = trailers
            .iter()
            .find_map(|t| t.get("Info"))
            .and_then(|o| o.reference().ok())
            .map(|r| r.id().id());
        let trailer = trailers.into_iter().next().unwrap();

        Ok(Self {
            root_id,
            info_id,
            head_ver,
            trailer,
            data: buf,
            xref,
        })
    }

    pub fn resolver(&self) -> ObjectResolver<'_> {
        ObjectResolver::new(&self.data, &self.xref)
    }

    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    pub fn root_id(&self) -> NonZeroU32 {
        self.root_id
    }

    pub fn info_id(&self) -> Option<NonZeroU32> {
        self.info_id
    }

    pub fn object_count(&self) -> usize {
        self.xref.count()
    }

    /// Catalog `/Version` overrides the header version.
    pub fn version(&self, resolver: &ObjectResolver) -> Result<String, ObjectValueError> {
        let catalog = self.catalog(resolver)?;
        Ok(catalog
            .ver()
            .map(|s| s.as_str().to_owned())
            .unwrap_or_else(|| self.head_ver.clone()))
    }

    pub fn catalog<'a, 'b: 'a>(
        &self,
        resolver: &'b ObjectResolver<'a>,
    ) -> Result<Catalog<'a, 'b>, ObjectValueError> {
        Catalog::parse(self.root_id, resolver)
    }
}
