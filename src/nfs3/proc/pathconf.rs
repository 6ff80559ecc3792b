//! PATHCONF (procedure 20, RFC 1813 §3.3.20).

use bytes::{Buf, BufMut};

use crate::nfs3::{write_post_op_attr, FileAttr, FileHandle, NFS3Status};
use crate::pipeline::PipelineError as Error;
use crate::xdr;

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
    pub obj_attributes: Option<FileAttr>,
    pub link_max: u32,
    pub name_max: u32,
    pub no_trunc: bool,
    pub chown_restricted: bool,
    pub case_insensitive: bool,
    pub case_preserving: bool,
}

impl Reply {
    pub fn write(&self, buf: &mut impl BufMut) {
        self.status.write(buf);
        write_post_op_attr(buf, &self.obj_attributes);
        if !self.status.is_ok() {
            return;
        }
        xdr::write_u32(buf, self.link_max);
        xdr::write_u32(buf, self.name_max);
        xdr::write_bool(buf, self.no_trunc);
        xdr::write_bool(buf, self.chown_restricted);
        xdr::write_bool(buf, self.case_insensitive);
        xdr::write_bool(buf, self.case_preserving);
    }
}
