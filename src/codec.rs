//! Schema-less binary codec.
//!
//! The wire format is driven entirely by the static type on both sides; no
//! type tags are written. All integers, including length prefixes, are
//! little-endian.
//!
//! | Category | Encoding |
//! |---|---|
//! | fixed-width scalar | raw bytes, no prefix |
//! | string | `u64` byte length, then the bytes |
//! | tuploid (tuple, array, record) | every field in order, no prefix |
//! | container | `u64` element count, then every element in iteration order |
//! | map | `u64` entry count, then key and value of every entry |
//! | custom type | whatever its own [Encode]/[Decode] pair writes |
//! | [crate::Table] | `u64` record count, then every record in default order |
//!
//! # Example
//! ```
//! use std::collections::BTreeMap;
//! use multitable::codec::{from_bytes, to_bytes};
//!
//! let mut scores = BTreeMap::new();
//! scores.insert("Alice".to_string(), vec![3u32, 5]);
//!
//! let bytes = to_bytes(&scores).unwrap();
//! let copy: BTreeMap<String, Vec<u32>> = from_bytes(&bytes).unwrap();
//! assert_eq!(copy, scores);
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::hash::{BuildHasher, Hash};
use std::io::{Read, Write};

use crate::error::CodecError;
use crate::shape::Shape;

/// Upper bound on what a declared length may preallocate.
const PREALLOC_LIMIT: usize = 4096;

/// Writes a value in the wire format.
///
/// Every encodable type states its [Shape]; a hand-written pair for a type
/// that is neither a container nor a tuploid gets the defaults from an empty
/// `impl Shape for T {}`.
pub trait Encode: Shape {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<(), CodecError>;
}

/// Reads a value back from the wire format.
pub trait Decode: Shape + Sized {
    fn decode<R: Read>(decoder: &mut Decoder<R>) -> Result<Self, CodecError>;
}

/// Bounds applied while decoding untrusted input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    /// Largest accepted length prefix, in bytes for strings and elements for
    /// containers.
    pub max_len: u64,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_len: u64::from(u32::MAX),
        }
    }
}

/// Reader side of the codec: a byte source plus the limits to enforce.
pub struct Decoder<R> {
    reader: R,
    limits: DecodeLimits,
}

impl<R: Read> Decoder<R> {
    pub fn new(reader: R) -> Self {
        Self::with_limits(reader, DecodeLimits::default())
    }

    pub fn with_limits(reader: R, limits: DecodeLimits) -> Self {
        Self { reader, limits }
    }

    pub fn limits(&self) -> DecodeLimits {
        self.limits
    }

    /// Gives back the reader, positioned right after the last decoded value.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Reads exactly `N` bytes.
    ///
    /// # Errors
    /// Returns [CodecError::Truncated] if the input ends first.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut buf = [0u8; N];
        self.reader.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads a length prefix and checks it against the limits.
    pub fn read_len(&mut self) -> Result<usize, CodecError> {
        let len = u64::from_le_bytes(self.read_array()?);
        if len > self.limits.max_len {
            return Err(CodecError::LengthLimit {
                len,
                max: self.limits.max_len,
            });
        }
        usize::try_from(len).map_err(|_| CodecError::LengthLimit {
            len,
            max: usize::MAX as u64,
        })
    }

    /// Reads exactly `len` bytes without trusting `len` for the allocation.
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::with_capacity(len.min(PREALLOC_LIMIT));
        (&mut self.reader).take(len as u64).read_to_end(&mut buf)?;
        if buf.len() != len {
            return Err(CodecError::Truncated);
        }
        Ok(buf)
    }
}

/// Writes a length or count prefix.
pub fn write_len<W: Write>(writer: &mut W, len: usize) -> Result<(), CodecError> {
    writer.write_all(&(len as u64).to_le_bytes())?;
    Ok(())
}

/// Writes `value` to `writer`.
pub fn serialize<T: Encode + ?Sized, W: Write>(writer: &mut W, value: &T) -> Result<(), CodecError> {
    value.encode(writer)
}

/// Reads one `T` from `reader` with the default limits.
///
/// Anything after the value is left in the reader.
pub fn deserialize<T: Decode, R: Read>(reader: R) -> Result<T, CodecError> {
    T::decode(&mut Decoder::new(reader))
}

pub fn to_bytes<T: Encode + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    value.encode(&mut out)?;
    Ok(out)
}

/// Decodes a `T` that must span all of `bytes`.
///
/// # Errors
/// Besides decode failures, returns [CodecError::TrailingBytes] if input is
/// left over.
pub fn from_bytes<T: Decode>(bytes: &[u8]) -> Result<T, CodecError> {
    let mut decoder = Decoder::new(bytes);
    let value = T::decode(&mut decoder)?;
    let rest = decoder.into_inner();
    if !rest.is_empty() {
        return Err(CodecError::TrailingBytes(rest.len()));
    }
    Ok(value)
}

macro_rules! scalar_codec {
    ($($ty:ty),+) => {
        $(
            impl Encode for $ty {
                fn encode<W: Write>(&self, writer: &mut W) -> Result<(), CodecError> {
                    writer.write_all(&self.to_le_bytes())?;
                    Ok(())
                }
            }

            impl Decode for $ty {
                fn decode<R: Read>(decoder: &mut Decoder<R>) -> Result<Self, CodecError> {
                    Ok(<$ty>::from_le_bytes(decoder.read_array()?))
                }
            }
        )+
    };
}

scalar_codec!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128, f32, f64);

impl Encode for bool {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<(), CodecError> {
        u8::from(*self).encode(writer)
    }
}

impl Decode for bool {
    fn decode<R: Read>(decoder: &mut Decoder<R>) -> Result<Self, CodecError> {
        match u8::decode(decoder)? {
            0 => Ok(false),
            1 => Ok(true),
            byte => Err(CodecError::InvalidBool(byte)),
        }
    }
}

impl Encode for char {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<(), CodecError> {
        u32::from(*self).encode(writer)
    }
}

impl Decode for char {
    fn decode<R: Read>(decoder: &mut Decoder<R>) -> Result<Self, CodecError> {
        let scalar = u32::decode(decoder)?;
        char::from_u32(scalar).ok_or(CodecError::InvalidChar(scalar))
    }
}

impl Encode for str {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<(), CodecError> {
        write_len(writer, self.len())?;
        writer.write_all(self.as_bytes())?;
        Ok(())
    }
}

impl Encode for String {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<(), CodecError> {
        self.as_str().encode(writer)
    }
}

impl Decode for String {
    fn decode<R: Read>(decoder: &mut Decoder<R>) -> Result<Self, CodecError> {
        let len = decoder.read_len()?;
        let bytes = decoder.read_bytes(len)?;
        String::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)
    }
}

impl<T: Encode + ?Sized> Encode for &T {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<(), CodecError> {
        (**self).encode(writer)
    }
}

impl<T: Encode + ?Sized> Encode for Box<T> {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<(), CodecError> {
        (**self).encode(writer)
    }
}

impl<T: Decode> Decode for Box<T> {
    fn decode<R: Read>(decoder: &mut Decoder<R>) -> Result<Self, CodecError> {
        T::decode(decoder).map(Box::new)
    }
}

macro_rules! tuple_codec {
    ($(($idx:tt, $T:ident)),+) => {
        impl<$($T: Encode),+> Encode for ($($T,)+) {
            fn encode<W: Write>(&self, writer: &mut W) -> Result<(), CodecError> {
                $(self.$idx.encode(writer)?;)+
                Ok(())
            }
        }

        impl<$($T: Decode),+> Decode for ($($T,)+) {
            fn decode<R: Read>(decoder: &mut Decoder<R>) -> Result<Self, CodecError> {
                Ok(($($T::decode(decoder)?,)+))
            }
        }
    };
}

tuple_codec!((0, A));
tuple_codec!((0, A), (1, B));
tuple_codec!((0, A), (1, B), (2, C));
tuple_codec!((0, A), (1, B), (2, C), (3, D));
tuple_codec!((0, A), (1, B), (2, C), (3, D), (4, F));
tuple_codec!((0, A), (1, B), (2, C), (3, D), (4, F), (5, G));
tuple_codec!((0, A), (1, B), (2, C), (3, D), (4, F), (5, G), (6, H));
tuple_codec!((0, A), (1, B), (2, C), (3, D), (4, F), (5, G), (6, H), (7, J));

// Arrays have a static arity, so no prefix.
impl<T: Encode, const N: usize> Encode for [T; N] {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<(), CodecError> {
        self.iter().try_for_each(|item| item.encode(writer))
    }
}

impl<T: Decode, const N: usize> Decode for [T; N] {
    fn decode<R: Read>(decoder: &mut Decoder<R>) -> Result<Self, CodecError> {
        let mut items = Vec::with_capacity(N);
        for _ in 0..N {
            items.push(T::decode(decoder)?);
        }
        // exactly N items were pushed
        items.try_into().map_err(|_| CodecError::Truncated)
    }
}

fn encode_seq<'a, T, W, I>(writer: &mut W, len: usize, items: I) -> Result<(), CodecError>
where
    T: Encode + 'a,
    W: Write,
    I: IntoIterator<Item = &'a T>,
{
    write_len(writer, len)?;
    items.into_iter().try_for_each(|item| item.encode(writer))
}

fn encode_map<'a, K, V, W, I>(writer: &mut W, len: usize, entries: I) -> Result<(), CodecError>
where
    K: Encode + 'a,
    V: Encode + 'a,
    W: Write,
    I: IntoIterator<Item = (&'a K, &'a V)>,
{
    write_len(writer, len)?;
    for (key, value) in entries {
        key.encode(writer)?;
        value.encode(writer)?;
    }
    Ok(())
}

/// Reads a count prefix, then decodes that many `T` into `push`.
fn decode_seq<T, R>(
    decoder: &mut Decoder<R>,
    mut push: impl FnMut(T) -> Result<(), CodecError>,
) -> Result<(), CodecError>
where
    T: Decode,
    R: Read,
{
    let len = decoder.read_len()?;
    for _ in 0..len {
        push(T::decode(decoder)?)?;
    }
    Ok(())
}

impl<T: Encode> Encode for [T] {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<(), CodecError> {
        encode_seq(writer, self.len(), self)
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<(), CodecError> {
        self.as_slice().encode(writer)
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode<R: Read>(decoder: &mut Decoder<R>) -> Result<Self, CodecError> {
        let len = decoder.read_len()?;
        let mut out = Vec::with_capacity(len.min(PREALLOC_LIMIT));
        for _ in 0..len {
            out.push(T::decode(decoder)?);
        }
        Ok(out)
    }
}

impl<T: Encode> Encode for VecDeque<T> {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<(), CodecError> {
        encode_seq(writer, self.len(), self)
    }
}

impl<T: Decode> Decode for VecDeque<T> {
    fn decode<R: Read>(decoder: &mut Decoder<R>) -> Result<Self, CodecError> {
        let mut out = VecDeque::new();
        decode_seq(decoder, |item| {
            out.push_back(item);
            Ok(())
        })?;
        Ok(out)
    }
}

impl<T: Encode> Encode for BTreeSet<T> {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<(), CodecError> {
        encode_seq(writer, self.len(), self)
    }
}

impl<T: Decode + Ord> Decode for BTreeSet<T> {
    fn decode<R: Read>(decoder: &mut Decoder<R>) -> Result<Self, CodecError> {
        let mut out = BTreeSet::new();
        decode_seq(decoder, |item| {
            if out.insert(item) {
                Ok(())
            } else {
                Err(CodecError::DuplicateKey)
            }
        })?;
        Ok(out)
    }
}

impl<K: Encode, V: Encode> Encode for BTreeMap<K, V> {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<(), CodecError> {
        encode_map(writer, self.len(), self)
    }
}

impl<K: Decode + Ord, V: Decode> Decode for BTreeMap<K, V> {
    fn decode<R: Read>(decoder: &mut Decoder<R>) -> Result<Self, CodecError> {
        let mut out = BTreeMap::new();
        decode_seq(decoder, |(key, value)| match out.insert(key, value) {
            None => Ok(()),
            Some(_) => Err(CodecError::DuplicateKey),
        })?;
        Ok(out)
    }
}

impl<T: Encode, S> Encode for HashSet<T, S> {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<(), CodecError> {
        encode_seq(writer, self.len(), self)
    }
}

impl<T: Decode + Eq + Hash, S: BuildHasher + Default> Decode for HashSet<T, S> {
    fn decode<R: Read>(decoder: &mut Decoder<R>) -> Result<Self, CodecError> {
        let mut out = HashSet::default();
        decode_seq(decoder, |item| {
            if out.insert(item) {
                Ok(())
            } else {
                Err(CodecError::DuplicateKey)
            }
        })?;
        Ok(out)
    }
}

impl<K: Encode, V: Encode, S> Encode for HashMap<K, V, S> {
    fn encode<W: Write>(&self, writer: &mut W) -> Result<(), CodecError> {
        encode_map(writer, self.len(), self)
    }
}

impl<K: Decode + Eq + Hash, V: Decode, S: BuildHasher + Default> Decode for HashMap<K, V, S> {
    fn decode<R: Read>(decoder: &mut Decoder<R>) -> Result<Self, CodecError> {
        let mut out = HashMap::default();
        decode_seq(decoder, |(key, value)| match out.insert(key, value) {
            None => Ok(()),
            Some(_) => Err(CodecError::DuplicateKey),
        })?;
        Ok(out)
    }
}

/// Implements the codec for a struct with named fields as a tuploid: every
/// listed field in order, no prefix. All fields must be listed.
///
/// # Example
/// ```
/// use multitable::{codec, impl_tuploid};
///
/// #[derive(Debug, PartialEq)]
/// struct Point {
///     x: i32,
///     y: i32,
/// }
///
/// impl_tuploid!(Point { x, y });
///
/// let bytes = codec::to_bytes(&Point { x: 1, y: -1 }).unwrap();
/// assert_eq!(bytes.len(), 8);
/// assert_eq!(codec::from_bytes::<Point>(&bytes).unwrap(), Point { x: 1, y: -1 });
/// ```
#[macro_export]
macro_rules! impl_tuploid {
    ($ty:ident { $($field:ident),+ $(,)? }) => {
        impl $crate::Shape for $ty {
            const IS_TUPLOID: bool = true;
        }

        impl $crate::Encode for $ty {
            fn encode<W: ::std::io::Write>(
                &self,
                writer: &mut W,
            ) -> ::core::result::Result<(), $crate::CodecError> {
                $($crate::Encode::encode(&self.$field, writer)?;)+
                ::core::result::Result::Ok(())
            }
        }

        impl $crate::Decode for $ty {
            fn decode<R: ::std::io::Read>(
                decoder: &mut $crate::Decoder<R>,
            ) -> ::core::result::Result<Self, $crate::CodecError> {
                ::core::result::Result::Ok(Self {
                    $($field: $crate::Decode::decode(decoder)?,)+
                })
            }
        }
    };
}
