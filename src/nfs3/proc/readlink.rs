//! READLINK (procedure 5, RFC 1813 §3.3.5).

use bytes::{Buf, BufMut};

use crate::nfs3::{write_post_op_attr, FileAttr, FileHandle, NFS3Status};
use crate::pipeline::PipelineError as Error;
use crate::xdr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub symlink: FileHandle,
}

impl Call {
    pub fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        Ok(Call { symlink: FileHandle::read(buf)? })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: NFS3Status,
    pub symlink_attributes: Option<FileAttr>,
    pub data: Option<String>,
}

impl Reply {
    pub fn write(&self, buf: &mut impl BufMut) -> Result<(), Error> {
        self.status.write(buf);
        write_post_op_attr(buf, &self.symlink_attributes);
        if self.status.is_ok() {
            debug_assert!(self.data.is_some(), "ok readlink reply without data");
            let data = self.data.as_deref().ok_or(Error::ProtocolInvariantViolated("ok readlink reply without data"))?;
            xdr::write_string(buf, data);
        }
        Ok(())
    }
}
