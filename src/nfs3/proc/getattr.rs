//! GETATTR (procedure 1, RFC 1813 §3.3.1).

use bytes::{Buf, BufMut};

use crate::nfs3::{FileAttr, FileHandle, NFS3Status};
use crate::pipeline::PipelineError as Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub object: FileHandle,
}

impl Call {
    pub fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        Ok(Call { object: FileHandle::read(buf)? })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: NFS3Status,
    pub attributes: Option<FileAttr>,
}

impl Reply {
    pub fn ok(attributes: FileAttr) -> Self {
        Reply { status: NFS3Status::Ok, attributes: Some(attributes) }
    }

    pub fn failure(status: NFS3Status) -> Self {
        debug_assert!(!status.is_ok());
        Reply { status, attributes: None }
    }

    pub fn write(&self, buf: &mut impl BufMut) -> Result<(), Error> {
        self.status.write(buf);
        if self.status.is_ok() {
            debug_assert!(self.attributes.is_some(), "ok getattr reply without attributes");
            self.attributes
                .as_ref()
                .ok_or(Error::ProtocolInvariantViolated("ok getattr reply without attributes"))?
                .write(buf);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn sample_attr() -> FileAttr {
        use crate::nfs3::{FileType, NfsTime, SpecData};
        FileAttr {
            file_type: FileType::Regular,
            mode: 0o644,
            nlink: 1,
            uid: 0,
            gid: 0,
            size: 0,
            used: 0,
            rdev: SpecData { major: 0, minor: 0 },
            fsid: 0,
            fileid: 1,
            atime: NfsTime { seconds: 0, nanoseconds: 0 },
            mtime: NfsTime { seconds: 0, nanoseconds: 0 },
            ctime: NfsTime { seconds: 0, nanoseconds: 0 },
        }
    }

    #[test]
    fn decodes_call_filehandle() {
        let mut fh_bytes = BytesMut::new();
        crate::xdr::write_blob(&mut fh_bytes, &1u64.to_be_bytes());
        let mut cursor = &fh_bytes[..];
        let call = Call::read(&mut cursor).unwrap();
        assert_eq!(call.object.0, 1u64.to_be_bytes());
    }

    #[test]
    fn ok_reply_encodes_status_then_attributes() {
        let reply = Reply::ok(sample_attr());
        let mut out = BytesMut::new();
        reply.write(&mut out).unwrap();
        let mut cursor = &out[..];
        assert_eq!(NFS3Status::read(&mut cursor).unwrap(), NFS3Status::Ok);
        assert_eq!(FileAttr::read(&mut cursor).unwrap(), sample_attr());
    }

    #[test]
    fn failure_reply_encodes_only_status() {
        let reply = Reply::failure(NFS3Status::NoEnt);
        let mut out = BytesMut::new();
        reply.write(&mut out).unwrap();
        assert_eq!(out.len(), 4);
    }
}
