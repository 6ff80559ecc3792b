//! XDR (RFC 4506) primitive encode/decode helpers shared by the RPC and
//! NFS3 codecs.
//!
//! All on-wire integers are big-endian. Opaque byte strings and text
//! strings are a `u32` length followed by the bytes and zero fill up to
//! the next multiple of [`ALIGNMENT`]. These mirror the teacher's
//! `parser::primitive` / `serializer` modules, rebased onto `bytes::{Buf,
//! BufMut}` so they compose with the pipeline's cumulation buffer instead
//! of a direct-socket `Read`/`Write`.

use bytes::{Buf, BufMut};
use thiserror::Error;

/// XDR values are aligned to 4-byte boundaries.
pub const ALIGNMENT: usize = 4;

/// Errors produced while decoding an XDR primitive.
///
/// [`Error::TooShort`] is the "need more data" signal: callers composing
/// primitives inside a `tokio_util::codec::Decoder::decode` impl
/// translate it into `Ok(None)` via [`parse_unwinding`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("buffer too short")]
    TooShort,
    #[error("length {0} exceeds configured maximum {1}")]
    TooLong(usize, usize),
    #[error("blob/string padding was not zero-filled")]
    BadPadding,
    #[error("string is not valid UTF-8")]
    NotUtf8,
    #[error("enum/union discriminant {0} has no matching variant")]
    BadDiscriminant(u32),
    #[error("boolean discriminant {0} must be 0 or 1")]
    BadBool(u32),
}

pub type Result<T> = std::result::Result<T, Error>;

fn padding_len(n: usize) -> usize {
    (ALIGNMENT - n % ALIGNMENT) % ALIGNMENT
}

/// Saves `buf`'s cursor, runs `f`, and restores the cursor if `f` returns
/// `Ok(None)` or `Err` — the "decoder unwinds on partial reads" contract of
/// spec §4.B. `buf` must be a type which can be cheaply "rewound"; here
/// that's any `&[u8]`-backed cursor exposing a byte offset, which is what
/// `tokio_util::codec::Framed` hands each `Decoder::decode` call via its
/// own accumulating `BytesMut`.
pub fn parse_unwinding<T, E, B: Buf + Clone>(
    buf: &mut B,
    f: impl FnOnce(&mut B) -> std::result::Result<Option<T>, E>,
) -> std::result::Result<Option<T>, E> {
    let snapshot = buf.clone();
    match f(buf) {
        Ok(Some(v)) => Ok(Some(v)),
        Ok(None) => {
            *buf = snapshot;
            Ok(None)
        }
        Err(e) => {
            *buf = snapshot;
            Err(e)
        }
    }
}

pub fn read_u8(buf: &mut impl Buf) -> Result<u8> {
    if buf.remaining() < 1 {
        return Err(Error::TooShort);
    }
    Ok(buf.get_u8())
}

pub fn read_u32(buf: &mut impl Buf) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(Error::TooShort);
    }
    Ok(buf.get_u32())
}

pub fn read_u64(buf: &mut impl Buf) -> Result<u64> {
    if buf.remaining() < 8 {
        return Err(Error::TooShort);
    }
    Ok(buf.get_u64())
}

pub fn read_bool(buf: &mut impl Buf) -> Result<bool> {
    match read_u32(buf)? {
        0 => Ok(false),
        1 => Ok(true),
        v => Err(Error::BadBool(v)),
    }
}

/// Reads the `u32` discriminator then, when present, the value.
pub fn read_optional<T, B: Buf>(
    buf: &mut B,
    cont: impl FnOnce(&mut B) -> Result<T>,
) -> Result<Option<T>> {
    match read_bool(buf)? {
        true => Ok(Some(cont(buf)?)),
        false => Ok(None),
    }
}

fn skip_padding(buf: &mut impl Buf, len: usize) -> Result<()> {
    let pad = padding_len(len);
    if buf.remaining() < pad {
        return Err(Error::TooShort);
    }
    for _ in 0..pad {
        if buf.get_u8() != 0 {
            return Err(Error::BadPadding);
        }
    }
    Ok(())
}

/// Reads a length-prefixed opaque blob, bounded by `max_len`.
pub fn read_blob(buf: &mut impl Buf, max_len: usize) -> Result<Vec<u8>> {
    let len = read_u32(buf)? as usize;
    if len > max_len {
        return Err(Error::TooLong(len, max_len));
    }
    if buf.remaining() < len {
        return Err(Error::TooShort);
    }
    let mut out = vec![0u8; len];
    buf.copy_to_slice(&mut out);
    skip_padding(buf, len)?;
    Ok(out)
}

/// Reads a fixed-size opaque array (no length prefix, still padded).
pub fn read_array<const N: usize>(buf: &mut impl Buf) -> Result<[u8; N]> {
    if buf.remaining() < N {
        return Err(Error::TooShort);
    }
    let mut out = [0u8; N];
    buf.copy_to_slice(&mut out);
    skip_padding(buf, N)?;
    Ok(out)
}

pub fn read_string(buf: &mut impl Buf, max_len: usize) -> Result<String> {
    let bytes = read_blob(buf, max_len)?;
    String::from_utf8(bytes).map_err(|_| Error::NotUtf8)
}

/// Reads an XDR enum/union discriminant as a raw `u32`; callers match it
/// against the concrete variant set (letting unknown values become
/// `Error::BadDiscriminant` at the call site with protocol-specific text).
pub fn read_discriminant(buf: &mut impl Buf) -> Result<u32> {
    read_u32(buf)
}

pub fn write_u32(buf: &mut impl BufMut, v: u32) {
    buf.put_u32(v);
}

pub fn write_u64(buf: &mut impl BufMut, v: u64) {
    buf.put_u64(v);
}

pub fn write_bool(buf: &mut impl BufMut, v: bool) {
    buf.put_u32(if v { 1 } else { 0 });
}

pub fn write_optional<T, B: BufMut>(buf: &mut B, v: Option<T>, cont: impl FnOnce(&mut B, T)) {
    match v {
        Some(val) => {
            write_bool(buf, true);
            cont(buf, val);
        }
        None => write_bool(buf, false),
    }
}

fn write_padding(buf: &mut impl BufMut, len: usize) {
    let pad = padding_len(len);
    buf.put_bytes(0, pad);
}

pub fn write_blob(buf: &mut impl BufMut, data: &[u8]) {
    write_u32(buf, data.len() as u32);
    buf.put_slice(data);
    write_padding(buf, data.len());
}

pub fn write_array<const N: usize>(buf: &mut impl BufMut, data: &[u8; N]) {
    buf.put_slice(data);
    write_padding(buf, N);
}

pub fn write_string(buf: &mut impl BufMut, s: &str) {
    write_blob(buf, s.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn blob_round_trip_pads_to_four() {
        let mut out = BytesMut::new();
        write_blob(&mut out, &[1, 2, 3]);
        assert_eq!(out.len(), 4 + 3 + 1);
        let mut cursor = &out[..];
        let back = read_blob(&mut cursor, 1024).unwrap();
        assert_eq!(back, vec![1, 2, 3]);
    }

    #[test]
    fn blob_rejects_nonzero_padding() {
        let mut out = BytesMut::new();
        write_blob(&mut out, &[1, 2, 3]);
        let last = out.len() - 1;
        out[last] = 0xFF;
        let mut cursor = &out[..];
        assert_eq!(read_blob(&mut cursor, 1024), Err(Error::BadPadding));
    }

    #[test]
    fn optional_round_trip() {
        let mut out = BytesMut::new();
        write_optional(&mut out, Some(7u32), |b, v| write_u32(b, v));
        let mut cursor = &out[..];
        let back = read_optional(&mut cursor, read_u32).unwrap();
        assert_eq!(back, Some(7));
    }

    #[test]
    fn too_short_is_recoverable_and_unwinds() {
        let data = [0u8, 0, 0];
        let mut cursor = &data[..];
        let result: std::result::Result<Option<u32>, Error> =
            parse_unwinding(&mut cursor, |b| read_u32(b).map(Some));
        assert_eq!(result, Err(Error::TooShort));
        assert_eq!(cursor.len(), 3);
    }

    proptest::proptest! {
        /// Property 3 (spec §8): a blob of length `L` encodes as
        /// `4 + L + pad(L)` bytes, the fill bytes are zero, and decoding
        /// recovers the original payload.
        #[test]
        fn prop_blob_round_trips_with_zero_padding(data in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..512)) {
            let mut out = BytesMut::new();
            write_blob(&mut out, &data);
            prop_assert_eq!(out.len(), 4 + data.len() + padding_len(data.len()));

            let mut cursor = &out[..];
            let back = read_blob(&mut cursor, data.len() + 1).unwrap();
            prop_assert_eq!(back, data);
            prop_assert!(cursor.is_empty());
        }

        /// Property 4 (spec §8): feeding any strict prefix of a valid
        /// encoded blob to `parse_unwinding` yields `None` (via
        /// `Error::TooShort`) and leaves the cursor exactly where it
        /// started.
        #[test]
        fn prop_prefix_of_blob_unwinds_cursor(
            data in proptest::collection::vec(proptest::prelude::any::<u8>(), 1..64),
            cut in 0usize..1000,
        ) {
            let mut out = BytesMut::new();
            write_blob(&mut out, &data);
            let full = out.len();
            let prefix_len = 1 + cut % (full - 1); // in 1..full, a strict prefix
            let mut cursor = &out[..prefix_len];
            let before = cursor.len();
            let result: std::result::Result<Option<Vec<u8>>, Error> =
                parse_unwinding(&mut cursor, |b| read_blob(b, data.len() + 1).map(Some));
            prop_assert!(result.is_err());
            prop_assert_eq!(cursor.len(), before);
        }
    }
}
