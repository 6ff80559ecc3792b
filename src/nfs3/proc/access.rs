//! ACCESS (procedure 4, RFC 1813 §3.3.4).

use bytes::{Buf, BufMut};

use crate::nfs3::{write_post_op_attr, FileAttr, FileHandle, NFS3Status};
use crate::pipeline::PipelineError as Error;
use crate::xdr;

pub const ACCESS_READ: u32 = 0x0001;
pub const ACCESS_LOOKUP: u32 = 0x0002;
pub const ACCESS_MODIFY: u32 = 0x0004;
pub const ACCESS_EXTEND: u32 = 0x0008;
pub const ACCESS_DELETE: u32 = 0x0010;
pub const ACCESS_EXECUTE: u32 = 0x0020;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub object: FileHandle,
    pub access: u32,
}

impl Call {
    pub fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        Ok(Call { object: FileHandle::read(buf)?, access: xdr::read_u32(buf)? })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: NFS3Status,
    pub object_attributes: Option<FileAttr>,
    /// Present only when `status` is OK: the subset of the requested
    /// bits the caller is actually granted.
    pub access: Option<u32>,
}

impl Reply {
    pub fn write(&self, buf: &mut impl BufMut) -> Result<(), Error> {
        self.status.write(buf);
        write_post_op_attr(buf, &self.object_attributes);
        if self.status.is_ok() {
            debug_assert!(self.access.is_some(), "ok access reply without granted mask");
            let access = self.access.ok_or(Error::ProtocolInvariantViolated("ok access reply without granted mask"))?;
            xdr::write_u32(buf, access);
        }
        Ok(())
    }
}
