//! FSINFO (procedure 19, RFC 1813 §3.3.19).

use bytes::{Buf, BufMut};

use crate::nfs3::{write_post_op_attr, FileAttr, FileHandle, NFS3Status, NfsTime};
use crate::pipeline::PipelineError as Error;
use crate::xdr;

pub const FSF_LINK: u32 = 0x0001;
pub const FSF_SYMLINK: u32 = 0x0002;
pub const FSF_HOMOGENEOUS: u32 = 0x0008;
pub const FSF_CANSETTIME: u32 = 0x0010;

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
    pub read_max_size: u32,
    pub read_pref_size: u32,
    pub read_multiple: u32,
    pub write_max_size: u32,
    pub write_pref_size: u32,
    pub write_multiple: u32,
    pub dir_pref_size: u32,
    pub max_file_size: u64,
    pub time_delta: NfsTime,
    /// Bitmask of `FSF_*` flags.
    pub properties: u32,
}

impl Reply {
    pub fn write(&self, buf: &mut impl BufMut) {
        self.status.write(buf);
        write_post_op_attr(buf, &self.obj_attributes);
        if !self.status.is_ok() {
            return;
        }
        xdr::write_u32(buf, self.read_max_size);
        xdr::write_u32(buf, self.read_pref_size);
        xdr::write_u32(buf, self.read_multiple);
        xdr::write_u32(buf, self.write_max_size);
        xdr::write_u32(buf, self.write_pref_size);
        xdr::write_u32(buf, self.write_multiple);
        xdr::write_u32(buf, self.dir_pref_size);
        xdr::write_u64(buf, self.max_file_size);
        self.time_delta.write(buf);
        xdr::write_u32(buf, self.properties);
    }
}
