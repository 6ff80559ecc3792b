//! FSSTAT (procedure 18, RFC 1813 §3.3.18).

use bytes::{Buf, BufMut};

use crate::nfs3::{write_post_op_attr, FileAttr, FileHandle, NFS3Status};
use crate::pipeline::PipelineError as Error;
use crate::xdr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub fsroot: FileHandle,
}

impl Call {
    pub fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        Ok(Call { fsroot: FileHandle::read(buf)? })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: NFS3Status,
    pub obj_attributes: Option<FileAttr>,
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub available_bytes: u64,
    pub total_files: u64,
    pub free_files: u64,
    pub available_files: u64,
    pub invarsec: u32,
}

impl Reply {
    pub fn write(&self, buf: &mut impl BufMut) {
        self.status.write(buf);
        write_post_op_attr(buf, &self.obj_attributes);
        if !self.status.is_ok() {
            return;
        }
        xdr::write_u64(buf, self.total_bytes);
        xdr::write_u64(buf, self.free_bytes);
        xdr::write_u64(buf, self.available_bytes);
        xdr::write_u64(buf, self.total_files);
        xdr::write_u64(buf, self.free_files);
        xdr::write_u64(buf, self.available_files);
        xdr::write_u32(buf, self.invarsec);
    }
}
