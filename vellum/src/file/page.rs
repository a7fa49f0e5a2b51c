use super::ObjectResolver;
use crate::object::{Dictionary, Object, ObjectValueError};
use ahash::{HashSet, HashSetExt};
use log::warn;
use std::num::NonZeroU32;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Rectangle {
    pub left_x: f32,
    pub lower_y: f32,
    pub right_x: f32,
    pub upper_y: f32,
}

impl Rectangle {
    /// From left, bottom, right, top, re-ordered so that left <= right
    /// and bottom <= top.
    pub fn from_lbrt(left_x: f32, bottom_y: f32, right_x: f32, top_y: f32) -> Self {
        Self {
            left_x: left_x.min(right_x),
            lower_y: bottom_y.min(top_y),
            right_x: left_x.max(right_x),
            upper_y: bottom_y.max(top_y),
        }
    }

    pub fn width(&self) -> f32 {
        self.right_x - self.left_x
    }

    pub fn height(&self) -> f32 {
        self.upper_y - self.lower_y
    }
}

/// Convert from a 4-number array, re-ordering corners.
impl TryFrom<&Object> for Rectangle {
    type Error = ObjectValueError;

    fn try_from(object: &Object) -> Result<Self, Self::Error> {
        let arr = object.as_arr()?;
        if arr.len() != 4 {
            return Err(ObjectValueError::UnexpectedType);
        }
        Ok(Self::from_lbrt(
            arr[0].as_number()?,
            arr[1].as_number()?,
            arr[2].as_number()?,
            arr[3].as_number()?,
        ))
    }
}

/// A `/Page` leaf with its chain of `/Pages` parents for inherited
/// attributes.
#[derive(Debug)]
pub struct Page<'a, 'b> {
    id: Option<NonZeroU32>,
    dict: &'b Dictionary,
    parents_to_root: Vec<&'b Dictionary>,
    resolver: &'b ObjectResolver<'a>,
}

impl<'a, 'b: 'a> Page<'a, 'b> {
    pub fn id(&self) -> Option<NonZeroU32> {
        self.id
    }

    pub fn dict(&self) -> &'b Dictionary {
        self.dict
    }

    fn iter_to_root(&self) -> impl Iterator<Item = &'b Dictionary> + '_ {
        std::iter::once(self.dict).chain(self.parents_to_root.iter().copied())
    }

    /// Inherited attribute: nearest definition from leaf to root.
    fn inherited(&self, key: &str) -> Result<Option<&'b Object>, ObjectValueError> {
        for d in self.iter_to_root() {
            if let Some(o) = self.resolver.opt_dict_value(d, key)? {
                return Ok(Some(o));
            }
        }
        Ok(None)
    }

    pub fn media_box(&self) -> Result<Option<Rectangle>, ObjectValueError> {
        self.inherited("MediaBox")?
            .map(Rectangle::try_from)
            .transpose()
    }

    pub fn resources(&self) -> Result<Option<&'b Dictionary>, ObjectValueError> {
        self.inherited("Resources")?
            .map(|o| o.as_dict())
            .transpose()
    }

    /// Decoded `/Contents`: a single stream or an array of streams,
    /// concatenated logically in order.
    pub fn content(&self) -> Result<PageContent, ObjectValueError> {
        let Some(contents) = self.resolver.opt_dict_value(self.dict, "Contents")? else {
            return Ok(PageContent::new(vec![]));
        };
        let bufs = match contents {
            Object::Stream(s) => {
                vec![s
                    .decode(self.resolver.file_buf(), self.resolver)?
                    .into_owned()]
            }
            Object::Array(arr) => {
                let mut bufs = Vec::with_capacity(arr.len());
                for o in arr {
                    let stream = self.resolver.resolve_reference(o)?.as_stream()?;
                    bufs.push(
                        stream
                            .decode(self.resolver.file_buf(), self.resolver)?
                            .into_owned(),
                    );
                }
                bufs
            }
            _ => return Err(ObjectValueError::UnexpectedType),
        };
        Ok(PageContent::new(bufs))
    }

    /// Walk the page tree from the `/Pages` root, collecting leaves in
    /// document order. A visited set of object numbers guards against
    /// reference cycles.
    pub(crate) fn parse(
        root_id: NonZeroU32,
        resolver: &'b ObjectResolver<'a>,
    ) -> Result<Vec<Self>, ObjectValueError> {
        fn is_leaf(d: &Dictionary) -> bool {
            match d.type_name().map(|n| n.as_str()) {
                Some("Page") => true,
                Some("Pages") => false,
                // untyped nodes: interior when they carry kids
                _ => !d.contains_key("Kids"),
            }
        }

        fn handle<'a, 'b: 'a>(
            id: Option<NonZeroU32>,
            node: &'b Dictionary,
            resolver: &'b ObjectResolver<'a>,
            pages: &mut Vec<Page<'a, 'b>>,
            parents: &mut Vec<&'b Dictionary>,
            visited: &mut HashSet<u32>,
        ) -> Result<(), ObjectValueError> {
            if is_leaf(node) {
                let mut parents_to_root = parents.clone();
                parents_to_root.reverse();
                pages.push(Page {
                    id,
                    dict: node,
                    parents_to_root,
                    resolver,
                });
                return Ok(());
            }

            let kids = resolver
                .opt_dict_value(node, "Kids")?
                .ok_or(ObjectValueError::DictKeyNotFound("Kids"))?
                .as_arr()?;
            parents.push(node);
            for kid in kids {
                let (kid_id, kid_dict) = match kid {
                    Object::Reference(r) => {
                        let id = r.id().id();
                        if !visited.insert(id.get()) {
                            warn!("page tree cycle at object {}, skipped", id);
                            continue;
                        }
                        (Some(id), resolver.resolve_or_null(id)?)
                    }
                    o => (None, o),
                };
                match kid_dict {
                    Object::Dictionary(d) => {
                        handle(kid_id, d, resolver, pages, parents, visited)?
                    }
                    Object::Null => warn!("page tree kid resolved to null, skipped"),
                    _ => return Err(ObjectValueError::UnexpectedType),
                }
            }
            parents.pop();
            Ok(())
        }

        let mut visited = HashSet::new();
        visited.insert(root_id.get());
        let root = resolver.resolve(root_id)?.as_dict()?;
        let mut pages = Vec::new();
        let mut parents = Vec::new();
        handle(
            Some(root_id),
            root,
            resolver,
            &mut pages,
            &mut parents,
            &mut visited,
        )?;
        Ok(pages)
    }
}

/// Decoded content stream buffers of one page.
pub struct PageContent {
    bufs: Vec<Vec<u8>>,
}

impl PageContent {
    pub fn new(bufs: Vec<Vec<u8>>) -> Self {
        Self { bufs }
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.bufs.iter().map(|v| v.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.bufs.iter().all(|b| b.is_empty())
    }
}

#[cfg(test)]
mod tests;
