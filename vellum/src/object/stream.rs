use super::{Dictionary, Object, ObjectId, ObjectValueError};
use crate::file::ObjectResolver;
use log::error;
use std::{borrow::Cow, fmt::Display, num::NonZeroU32};

const KEY_FILTER: &str = "Filter";
const KEY_FILTER_PARAMS: &str = "DecodeParms";
const KEY_LENGTH: &str = "Length";

const FILTER_FLATE_DECODE: &str = "FlateDecode";

/// Position of stream data inside the file buffer. `length` is `None`
/// until `/Length` is known; an indirect `/Length` resolves at decode
/// time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufPos {
    start: u32,
    length: Option<NonZeroU32>,
}

impl BufPos {
    pub fn new(start: u32, length: Option<NonZeroU32>) -> Self {
        Self { start, length }
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn length(&self) -> Option<NonZeroU32> {
        self.length
    }
}

/// Stream object: dictionary plus the span of its raw data. Data is
/// delimited by `/Length` exactly, never by scanning for the
/// `endstream` keyword.
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    dict: Dictionary,
    buf_pos: BufPos,
    id: ObjectId,
}

/// error!() log if r is error, returns `Err(ObjectValueError::FilterDecodeError)`
fn handle_filter_error<V, E: Display>(
    r: Result<V, E>,
    filter_name: &str,
) -> Result<V, ObjectValueError> {
    r.map_err(|err| {
        error!("failed to decode stream using {}: {}", filter_name, &err);
        ObjectValueError::FilterDecodeError
    })
}

impl Stream {
    pub fn new(dict: Dictionary, buf_pos: BufPos, id: ObjectId) -> Self {
        Self { dict, buf_pos, id }
    }

    pub fn as_dict(&self) -> &Dictionary {
        &self.dict
    }

    pub fn take_dict(self) -> Dictionary {
        self.dict
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn buf_pos(&self) -> BufPos {
        self.buf_pos
    }

    /// Shift the data span by the offset of the parse slice inside the
    /// whole file, so later decodes index the full buffer.
    #[must_use]
    pub fn rebase(self, base: u32) -> Self {
        Self {
            buf_pos: BufPos::new(self.buf_pos.start + base, self.buf_pos.length),
            ..self
        }
    }

    fn data_len(&self, resolver: Option<&ObjectResolver>) -> Result<usize, ObjectValueError> {
        if let Some(len) = self.buf_pos.length {
            return Ok(len.get() as usize);
        }
        match self.dict.get(KEY_LENGTH) {
            Some(Object::Integer(l)) if *l >= 0 => Ok(*l as usize),
            Some(Object::Reference(r)) => {
                let resolver = resolver.ok_or(ObjectValueError::StreamLengthNotDefined)?;
                let l = resolver.resolve(r.id().id())?.as_int()?;
                if l < 0 {
                    return Err(ObjectValueError::StreamLengthNotDefined);
                }
                Ok(l as usize)
            }
            _ => Err(ObjectValueError::StreamLengthNotDefined),
        }
    }

    /// Raw (still encoded) stream bytes.
    pub fn raw_data<'a>(
        &self,
        file: &'a [u8],
        resolver: Option<&ObjectResolver>,
    ) -> Result<&'a [u8], ObjectValueError> {
        let start = self.buf_pos.start as usize;
        let len = self.data_len(resolver)?;
        file.get(start..start + len).ok_or_else(|| {
            ObjectValueError::ParseError(start, "stream data exceeds file bounds".into())
        })
    }

    /// Decode stream data, applying the declared filter chain.
    pub fn decode<'a>(
        &self,
        file: &'a [u8],
        resolver: &ObjectResolver,
    ) -> Result<Cow<'a, [u8]>, ObjectValueError> {
        self.decode_inner(file, Some(resolver))
    }

    /// Decode without an object resolver; `/Length` must be a direct
    /// integer. Used while the xref table itself is being built.
    pub fn decode_without_resolve_length<'a>(
        &self,
        file: &'a [u8],
    ) -> Result<Cow<'a, [u8]>, ObjectValueError> {
        self.decode_inner(file, None)
    }

    fn decode_inner<'a>(
        &self,
        file: &'a [u8],
        resolver: Option<&ObjectResolver>,
    ) -> Result<Cow<'a, [u8]>, ObjectValueError> {
        let mut data = Cow::Borrowed(self.raw_data(file, resolver)?);
        for (filter_name, params) in self.iter_filter()? {
            data = Cow::Owned(filter(&data, filter_name, params)?);
        }
        Ok(data)
    }

    fn iter_filter(
        &self,
    ) -> Result<Vec<(&str, Option<&Dictionary>)>, ObjectValueError> {
        let filters: Vec<&str> = match self.dict.get(KEY_FILTER) {
            None | Some(Object::Null) => vec![],
            Some(Object::Name(n)) => vec![n.as_str()],
            Some(Object::Array(arr)) => arr
                .iter()
                .map(|o| o.as_name().map(|n| n.as_str()))
                .collect::<Result<_, _>>()?,
            Some(_) => return Err(ObjectValueError::UnexpectedType),
        };
        let params: Vec<Option<&Dictionary>> = match self.dict.get(KEY_FILTER_PARAMS) {
            None | Some(Object::Null) => vec![None; filters.len()],
            Some(Object::Dictionary(d)) => vec![Some(d)],
            Some(Object::Array(arr)) => arr
                .iter()
                .map(|o| match o {
                    Object::Null => Ok(None),
                    Object::Dictionary(d) => Ok(Some(d)),
                    _ => Err(ObjectValueError::UnexpectedType),
                })
                .collect::<Result<_, _>>()?,
            Some(_) => return Err(ObjectValueError::UnexpectedType),
        };
        Ok(filters
            .into_iter()
            .zip(params.into_iter().chain(std::iter::repeat(None)))
            .collect())
    }
}

struct FlateDecodeParams {
    predictor: i32,
    colors: i32,
    bits_per_component: i32,
    columns: i32,
}

impl FlateDecodeParams {
    pub fn new(d: Option<&Dictionary>) -> Result<Self, ObjectValueError> {
        Ok(match d {
            Some(d) => Self {
                predictor: d.get_int("Predictor", 1)?,
                colors: d.get_int("Colors", 1)?,
                bits_per_component: d.get_int("BitsPerComponent", 8)?,
                columns: d.get_int("Columns", 1)?,
            },
            None => Self {
                predictor: 1,
                colors: 1,
                bits_per_component: 8,
                columns: 1,
            },
        })
    }
}

/// Paeth, returns a, b, or c, whichever is closest to a + b - c
fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let aa = i16::from(a);
    let bb = i16::from(b);
    let cc = i16::from(c);

    let p = aa + bb - cc;

    let da = (p - aa).abs();
    let db = (p - bb).abs();
    let dc = (p - cc).abs();

    if da <= db && da <= dc {
        a
    } else if db <= dc {
        b
    } else {
        c
    }
}

/// Restore data processed by a png predictor.
fn png_predictor(buf: &[u8], columns: i32) -> Result<Vec<u8>, ObjectValueError> {
    let columns = columns as usize;
    let first_row = vec![0u8; columns];
    let mut upper_row = &first_row[..];
    let mut r = vec![0u8; buf.len() / (columns + 1) * columns];
    for (cur_row, dest_row) in buf.chunks(columns + 1).zip(r.chunks_mut(columns)) {
        let (flag, cur_row) = cur_row.split_first().unwrap();
        match flag {
            0 => dest_row.copy_from_slice(cur_row),
            1 => {
                // left
                dest_row[0] = cur_row[0];
                for i in 1..dest_row.len() {
                    dest_row[i] = cur_row[i].wrapping_add(dest_row[i - 1]);
                }
            }
            2 => {
                // up
                for (dest, (up, cur)) in dest_row.iter_mut().zip(upper_row.iter().zip(cur_row)) {
                    *dest = cur.wrapping_add(*up);
                }
            }
            3 => {
                // average of left and up
                for i in 0..dest_row.len() {
                    let left = if i == 0 { 0 } else { dest_row[i - 1] };
                    let up = upper_row[i];
                    dest_row[i] =
                        cur_row[i].wrapping_add(((i16::from(left) + i16::from(up)) / 2) as u8);
                }
            }
            4 => {
                // paeth
                for i in 0..dest_row.len() {
                    let left = if i == 0 { 0 } else { dest_row[i - 1] };
                    let left_up = if i == 0 { 0 } else { upper_row[i - 1] };
                    let up = upper_row[i];
                    dest_row[i] = cur_row[i].wrapping_add(paeth(left, up, left_up));
                }
            }
            _ => {
                error!("unknown png predictor: {}", flag);
                return Err(ObjectValueError::FilterDecodeError);
            }
        }
        upper_row = dest_row;
    }
    Ok(r)
}

fn predictor_decode(
    buf: Vec<u8>,
    params: &FlateDecodeParams,
) -> Result<Vec<u8>, ObjectValueError> {
    match params.predictor {
        1 => Ok(buf),
        10..=15 => png_predictor(
            &buf,
            params.columns * params.bits_per_component / 8 * params.colors,
        ),
        _ => {
            error!("unsupported predictor: {}", params.predictor);
            Err(ObjectValueError::FilterDecodeError)
        }
    }
}

fn decode_flate(buf: &[u8], params: &FlateDecodeParams) -> Result<Vec<u8>, ObjectValueError> {
    use flate2::bufread::{DeflateDecoder, ZlibDecoder};
    use std::io::Read;

    let mut r = Vec::with_capacity(buf.len() * 4);
    let mut decoder = ZlibDecoder::new(buf);
    handle_filter_error(
        decoder.read_to_end(&mut r).or_else(|_| {
            r.clear();
            DeflateDecoder::new(buf).read_to_end(&mut r)
        }),
        FILTER_FLATE_DECODE,
    )?;

    predictor_decode(r, params)
}

fn filter(
    buf: &[u8],
    filter_name: &str,
    params: Option<&Dictionary>,
) -> Result<Vec<u8>, ObjectValueError> {
    match filter_name {
        FILTER_FLATE_DECODE => decode_flate(buf, &FlateDecodeParams::new(params)?),
        _ => {
            error!("unknown filter: {}", filter_name);
            Err(ObjectValueError::UnknownFilter)
        }
    }
}
