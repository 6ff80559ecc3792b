//! LOOKUP (procedure 3, RFC 1813 §3.3.3).

use bytes::{Buf, BufMut};

use crate::nfs3::{write_post_op_attr, DirOpArgs, FileAttr, FileHandle, NFS3Status};
use crate::pipeline::PipelineError as Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub what: DirOpArgs,
}

impl Call {
    pub fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        Ok(Call { what: DirOpArgs::read(buf)? })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: NFS3Status,
    /// Present only when `status` is OK.
    pub object: Option<FileHandle>,
    pub object_attributes: Option<FileAttr>,
    pub dir_attributes: Option<FileAttr>,
}

impl Reply {
    pub fn ok(object: FileHandle, object_attributes: Option<FileAttr>, dir_attributes: Option<FileAttr>) -> Self {
        Reply { status: NFS3Status::Ok, object: Some(object), object_attributes, dir_attributes }
    }

    pub fn failure(status: NFS3Status, dir_attributes: Option<FileAttr>) -> Self {
        debug_assert!(!status.is_ok());
        Reply { status, object: None, object_attributes: None, dir_attributes }
    }

    pub fn write(&self, buf: &mut impl BufMut) -> Result<(), Error> {
        self.status.write(buf);
        if self.status.is_ok() {
            debug_assert!(self.object.is_some(), "ok lookup reply without object");
            self.object
                .as_ref()
                .ok_or(Error::ProtocolInvariantViolated("ok lookup reply without object"))?
                .write(buf);
            write_post_op_attr(buf, &self.object_attributes);
        }
        write_post_op_attr(buf, &self.dir_attributes);
        Ok(())
    }
}
