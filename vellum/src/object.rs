//! Data structures mapping to the low level document objects.
use ahash::{HashMap, HashMapExt};
use inkscript::Name;
use std::{borrow::Cow, iter::Peekable, num::NonZeroU32, rc::Rc, str::from_utf8};

mod indirect_object;
pub use indirect_object::IndirectObject;
mod stream;
pub use stream::*;
mod xref;
pub use xref::{Entry as XRefEntry, FilePos, Section as XRefSection};
mod frame;
pub use frame::*;

use crate::parser;

pub type Array = Vec<Object>;

#[derive(PartialEq, Debug, Clone, Default)]
pub struct Dictionary(HashMap<Name, Object>);

impl FromIterator<(Name, Object)> for Dictionary {
    fn from_iter<T: IntoIterator<Item = (Name, Object)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl std::ops::Deref for Dictionary {
    type Target = HashMap<Name, Object>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::ops::DerefMut for Dictionary {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Dictionary {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn set(&mut self, id: Name, value: impl Into<Object>) {
        self.0.insert(id, value.into());
    }

    pub fn get_int(&self, id: &str, default: i32) -> Result<i32, ObjectValueError> {
        self.0.get(id).map_or(Ok(default), |o| o.int())
    }

    pub fn get_opt_int(&self, id: &str) -> Result<Option<i32>, ObjectValueError> {
        self.0.get(id).map_or(Ok(None), |o| o.int().map(Some))
    }

    pub fn get_name(&self, id: &str) -> Result<Option<&Name>, ObjectValueError> {
        self.0.get(id).map_or(Ok(None), |o| o.as_name().map(Some))
    }

    pub fn type_name(&self) -> Option<&Name> {
        self.0.get("Type").and_then(|o| o.as_name().ok())
    }
}

#[derive(Clone, PartialEq, Debug, thiserror::Error)]
pub enum ObjectValueError {
    #[error("unexpected type")]
    UnexpectedType,
    #[error("invalid name format")]
    InvalidNameFormat,
    #[error("unknown filter")]
    UnknownFilter,
    #[error("filter decode error")]
    FilterDecodeError,
    #[error("stream length not defined")]
    StreamLengthNotDefined,
    #[error("object not found by id {0}")]
    ObjectIDNotFound(u32),
    #[error("parse error at byte {0}: {1}")]
    ParseError(usize, String),
    #[error("dict key not found: {0}")]
    DictKeyNotFound(&'static str),
    #[error("content operation schema error")]
    OperationSchemaError,
    #[error("content execution error: {0}")]
    ContentExecution(String),
}

#[derive(Clone, PartialEq, Debug)]
pub enum Object {
    Null,
    Bool(bool),
    Integer(i32),
    Number(f32),
    LiteralString(LiteralString),
    HexString(HexString),
    Name(Name),
    Dictionary(Dictionary),
    Array(Array),
    Stream(Rc<Stream>),
    Reference(Reference),
}

macro_rules! copy_value_access {
    ($method:ident, $opt_method:ident, $branch:ident, $t:ty) => {
        impl Object {
            /// Return None if value not specific type.
            pub fn $opt_method(&self) -> Option<$t> {
                match self {
                    Self::$branch(v) => Some(v.clone()),
                    _ => None,
                }
            }

            /// Return `ObjectValueError::UnexpectedType` if value not expected type.
            pub fn $method(&self) -> Result<$t, ObjectValueError> {
                match self {
                    Self::$branch(v) => Ok(v.clone()),
                    _ => Err(ObjectValueError::UnexpectedType),
                }
            }
        }
    };
}
macro_rules! ref_value_access {
    ($method:ident, $opt_method:ident, $branch:ident, $t:ty) => {
        impl Object {
            /// Return None if value not specific type.
            pub fn $opt_method(&self) -> Option<$t> {
                match self {
                    Self::$branch(v) => Some(v),
                    _ => None,
                }
            }

            /// Return `ObjectValueError::UnexpectedType` if value not expected type.
            pub fn $method(&self) -> Result<$t, ObjectValueError> {
                match self {
                    Self::$branch(v) => Ok(v),
                    _ => Err(ObjectValueError::UnexpectedType),
                }
            }
        }
    };
}

copy_value_access!(bool, opt_bool, Bool, bool);
copy_value_access!(int, opt_int, Integer, i32);
copy_value_access!(number, opt_number, Number, f32);
copy_value_access!(name, opt_name, Name, Name);
copy_value_access!(reference, opt_reference, Reference, Reference);
ref_value_access!(literal_str, opt_literal_str, LiteralString, &LiteralString);
ref_value_access!(hex_str, opt_hex_str, HexString, &HexString);
ref_value_access!(arr, opt_arr, Array, &Array);

impl Object {
    pub fn new_ref(id: u32) -> Self {
        Self::Reference(Reference::new_u32(id, 0))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Result<bool, ObjectValueError> {
        self.bool()
    }

    pub fn as_int(&self) -> Result<i32, ObjectValueError> {
        self.int()
    }

    /// Integer promotes to number.
    pub fn as_number(&self) -> Result<f32, ObjectValueError> {
        match self {
            Object::Number(f) => Ok(*f),
            Object::Integer(v) => Ok(*v as f32),
            _ => Err(ObjectValueError::UnexpectedType),
        }
    }

    pub fn as_name(&self) -> Result<&Name, ObjectValueError> {
        match self {
            Object::Name(n) => Ok(n),
            _ => Err(ObjectValueError::UnexpectedType),
        }
    }

    /// Stream objects answer with their dictionary.
    pub fn as_dict(&self) -> Result<&Dictionary, ObjectValueError> {
        match self {
            Object::Dictionary(d) => Ok(d),
            Object::Stream(s) => Ok(s.as_dict()),
            _ => Err(ObjectValueError::UnexpectedType),
        }
    }

    pub fn as_arr(&self) -> Result<&Array, ObjectValueError> {
        self.arr()
    }

    pub fn as_stream(&self) -> Result<&Stream, ObjectValueError> {
        match self {
            Object::Stream(s) => Ok(s),
            _ => Err(ObjectValueError::UnexpectedType),
        }
    }

    pub fn as_ref(&self) -> Result<&Reference, ObjectValueError> {
        match self {
            Object::Reference(r) => Ok(r),
            _ => Err(ObjectValueError::UnexpectedType),
        }
    }

    /// Decoded bytes of either string flavor.
    pub fn as_byte_string(&self) -> Result<&[u8], ObjectValueError> {
        match self {
            Object::LiteralString(s) => Ok(s.as_bytes()),
            Object::HexString(s) => Ok(s.as_bytes()),
            _ => Err(ObjectValueError::UnexpectedType),
        }
    }
}

impl From<Stream> for Object {
    fn from(value: Stream) -> Self {
        Self::Stream(Rc::new(value))
    }
}

impl From<Array> for Object {
    fn from(value: Array) -> Self {
        Self::Array(value)
    }
}

impl From<Reference> for Object {
    fn from(value: Reference) -> Self {
        Self::Reference(value)
    }
}

impl From<Dictionary> for Object {
    fn from(value: Dictionary) -> Self {
        Self::Dictionary(value)
    }
}

impl From<Name> for Object {
    fn from(value: Name) -> Self {
        Self::Name(value)
    }
}

impl From<f32> for Object {
    fn from(value: f32) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for Object {
    fn from(value: i32) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for Object {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<LiteralString> for Object {
    fn from(value: LiteralString) -> Self {
        Self::LiteralString(value)
    }
}

impl From<HexString> for Object {
    fn from(value: HexString) -> Self {
        Self::HexString(value)
    }
}

/// Convert [u8] to Object based on first char,
/// if start with '(' or '<', convert to LiteralString or HexString,
/// if start with '/' convert to Name, panic otherwise.
#[cfg(test)]
impl<'a> From<&'a [u8]> for Object {
    fn from(value: &'a [u8]) -> Self {
        assert!(!value.is_empty());
        match value[0] {
            b'(' => Self::LiteralString(LiteralString::new(value)),
            b'<' => Self::HexString(HexString::new(value)),
            b'/' => Self::Name(inkscript::name(from_utf8(&value[1..]).unwrap())),
            _ => panic!("invalid object"),
        }
    }
}

#[cfg(test)]
impl<'a> From<&'a str> for Object {
    fn from(value: &'a str) -> Self {
        value.as_bytes().into()
    }
}

/// Decoded literal string, enclosing parentheses and escapes resolved.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct LiteralString(Box<[u8]>);

impl LiteralString {
    /// `s` is the raw source text including the enclosing parentheses.
    pub fn new(s: &[u8]) -> Self {
        fn skip_cur_new_line<I: Iterator<Item = u8>>(cur: u8, s: &mut Peekable<I>) -> bool {
            if cur == b'\r' {
                s.next_if_eq(&b'\n');
                true
            } else if cur == b'\n' {
                s.next_if_eq(&b'\r');
                true
            } else {
                false
            }
        }

        fn skip_next_line<I: Iterator<Item = u8>>(s: &mut Peekable<I>) -> bool {
            if s.next_if_eq(&b'\r').is_some() {
                s.next_if_eq(&b'\n');
                true
            } else if s.next_if_eq(&b'\n').is_some() {
                s.next_if_eq(&b'\r');
                true
            } else {
                false
            }
        }

        fn next_oct_byte<I: Iterator<Item = u8>>(s: &mut Peekable<I>) -> Option<u8> {
            let mut result: u8 = 0;
            let mut hit = false;
            for _ in 0..3 {
                if let Some(c) = s.next_if(|v| matches!(v, b'0'..=b'7')) {
                    hit = true;
                    result = result.wrapping_mul(8).wrapping_add(c - b'0');
                }
            }
            hit.then_some(result)
        }

        debug_assert!(s.starts_with(b"(") && s.ends_with(b")"));
        let s = &s[1..s.len() - 1];
        let mut result: Vec<u8> = Vec::with_capacity(s.len());
        let mut iter = s.iter().copied().peekable();

        while let Some(next) = iter.next() {
            match next {
                b'\\' => {
                    if skip_next_line(&mut iter) {
                        continue;
                    }
                    if let Some(b) = next_oct_byte(&mut iter) {
                        result.push(b);
                        continue;
                    }

                    if let Some(b) = iter.next() {
                        match b {
                            b'r' => result.push(b'\r'),
                            b'n' => result.push(b'\n'),
                            b't' => result.push(b'\t'),
                            b'f' => result.push(b'\x0c'),
                            b'b' => result.push(b'\x08'),
                            b'(' => result.push(b'('),
                            b')' => result.push(b')'),
                            _ => result.push(b),
                        }
                    }
                }
                _ => {
                    if skip_cur_new_line(next, &mut iter) {
                        result.push(b'\n');
                    } else {
                        result.push(next);
                    }
                }
            }
        }

        Self(result.into())
    }

    pub fn as_str(&self) -> &str {
        from_utf8(&self.0).unwrap()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_ref()
    }
}

/// Decoded hex string; whitespace between digits ignored, odd digit
/// count padded with a trailing zero.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct HexString(Box<[u8]>);

impl HexString {
    /// `s` is the raw source text including the angle brackets.
    pub fn new(s: &[u8]) -> Self {
        fn hex_value(b: u8) -> u8 {
            match b {
                b'0'..=b'9' => b - b'0',
                b'a'..=b'f' => b - b'a' + 10,
                b'A'..=b'F' => b - b'A' + 10,
                _ => unreachable!("parser only accepts hex digits"),
            }
        }

        fn filter_whitespace(s: &[u8]) -> Cow<[u8]> {
            if s.iter().copied().any(|b| b.is_ascii_whitespace()) {
                Cow::Owned(
                    s.iter()
                        .copied()
                        .filter(|b| !b.is_ascii_whitespace())
                        .collect::<Vec<_>>(),
                )
            } else {
                Cow::Borrowed(s)
            }
        }

        debug_assert!(s.starts_with(b"<") && s.ends_with(b">"));
        let s = &s[1..s.len() - 1];
        let s = filter_whitespace(s);
        let decoded: Vec<u8> = s
            .chunks(2)
            .map(|pair| {
                let hi = hex_value(pair[0]);
                let lo = pair.get(1).copied().map_or(0, hex_value);
                (hi << 4) | lo
            })
            .collect();
        Self(decoded.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_ref()
    }
}

#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub struct ObjectId {
    id: NonZeroU32,
    generation: u16,
}

impl ObjectId {
    pub fn new(id: NonZeroU32, generation: u16) -> Self {
        Self { id, generation }
    }

    pub fn id(&self) -> NonZeroU32 {
        self.id
    }

    pub fn generation(&self) -> u16 {
        self.generation
    }
}

#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub struct Reference(ObjectId);

impl Reference {
    pub fn new(id: NonZeroU32, generation: u16) -> Self {
        Self(ObjectId::new(id, generation))
    }

    /// Panic if id is zero
    pub fn new_u32(id: u32, generation: u16) -> Self {
        Self(ObjectId::new(NonZeroU32::new(id).unwrap(), generation))
    }

    pub fn id(&self) -> ObjectId {
        self.0
    }
}

#[cfg(test)]
impl From<u32> for Object {
    fn from(value: u32) -> Self {
        Self::Reference(Reference::new_u32(value, 0))
    }
}

impl<'a> From<parser::ParseError<'a>> for ObjectValueError {
    fn from(e: parser::ParseError) -> Self {
        Self::ParseError(0, format!("{:?}", e))
    }
}
