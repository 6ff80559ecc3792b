//! READ (procedure 6, RFC 1813 §3.3.6).
//!
//! The reply payload can run to megabytes, so the reply writer never
//! copies it into the frame buffer. [`Reply::write`] writes everything
//! up to the data blob's length prefix, patches the enclosing fragment
//! header to the *total* promised length, and hands the caller a
//! [`NextStep`] describing the zero-copy payload (plus XDR fill bytes)
//! still owed — spec §4.F "partial-write protocol", §8 scenario 6.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::nfs3::{write_post_op_attr, FileAttr, FileHandle, NFS3Status, MAX_READ_LEN};
use crate::pipeline::PipelineError as Error;
use crate::rpc::framing;
use crate::xdr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub file: FileHandle,
    pub offset: u64,
    pub count: u32,
}

impl Call {
    pub fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        Ok(Call {
            file: FileHandle::read(buf)?,
            offset: xdr::read_u64(buf)?,
            count: xdr::read_u32(buf)?,
        })
    }
}

/// What the caller must still do to finish a READ reply frame.
#[derive(Debug)]
pub enum NextStep {
    /// The reply carried no data blob (a failure reply); nothing left
    /// to append.
    DoNothing,
    /// Append `payload` then `fill_bytes` zero bytes to reach 4-byte
    /// alignment.
    WriteBlob { payload: Bytes, fill_bytes: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: NFS3Status,
    pub file_attributes: Option<FileAttr>,
    pub count: u32,
    pub eof: bool,
    pub data: Option<Bytes>,
}

impl Reply {
    pub fn ok(file_attributes: Option<FileAttr>, eof: bool, data: Bytes) -> Self {
        Reply {
            status: NFS3Status::Ok,
            file_attributes,
            count: data.len() as u32,
            eof,
            data: Some(data),
        }
    }

    pub fn failure(status: NFS3Status, file_attributes: Option<FileAttr>) -> Self {
        debug_assert!(!status.is_ok());
        Reply { status, file_attributes, count: 0, eof: false, data: None }
    }

    /// Writes everything but the data payload into `dst`, then patches
    /// the fragment header at `fragment_header_pos` to the total length
    /// this reply will occupy once the caller appends the returned
    /// [`NextStep`]'s bytes.
    pub fn write(&self, dst: &mut BytesMut, fragment_header_pos: usize) -> NextStep {
        self.status.write(dst);
        write_post_op_attr(dst, &self.file_attributes);

        let Some(data) = &self.data else {
            return NextStep::DoNothing;
        };
        debug_assert!(data.len() <= MAX_READ_LEN);

        xdr::write_u32(dst, self.count);
        xdr::write_bool(dst, self.eof);
        xdr::write_u32(dst, data.len() as u32);

        let fill_bytes = (4 - data.len() % 4) % 4;
        let promised_total = dst.len() - fragment_header_pos - 4 + data.len() + fill_bytes;
        framing::patch_header_for_promised_len(dst, fragment_header_pos, promised_total);

        NextStep::WriteBlob { payload: data.clone(), fill_bytes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_mib_read_patches_header_to_full_length() {
        let mut dst = BytesMut::new();
        let header_pos = framing::write_placeholder_header(&mut dst);
        let payload = Bytes::from(vec![0xABu8; 2 * 1024 * 1024 + 1]); // forces 3 fill bytes
        let reply = Reply::ok(None, true, payload.clone());
        let step = reply.write(&mut dst, header_pos);
        let NextStep::WriteBlob { payload: returned, fill_bytes } = step else {
            panic!("expected WriteBlob");
        };
        assert_eq!(returned, payload);
        assert_eq!(fill_bytes, 3);

        let header_len_before_payload = dst.len() - header_pos - 4;
        dst.put_slice(&returned);
        dst.put_bytes(0, fill_bytes);

        let declared = u32::from_be_bytes(dst[header_pos..header_pos + 4].try_into().unwrap())
            & 0x7FFF_FFFF;
        let actual_payload_len = dst.len() - header_pos - 4;
        assert_eq!(declared as usize, actual_payload_len);
        assert_eq!(actual_payload_len, header_len_before_payload + payload.len() + fill_bytes);
    }

    #[test]
    fn failure_reply_writes_no_blob() {
        let mut dst = BytesMut::new();
        let header_pos = framing::write_placeholder_header(&mut dst);
        let reply = Reply::failure(NFS3Status::Io, None);
        let step = reply.write(&mut dst, header_pos);
        assert!(matches!(step, NextStep::DoNothing));
    }
}
