//! SETATTR (procedure 2, RFC 1813 §3.3.2).

use bytes::{Buf, BufMut};

use crate::nfs3::{FileHandle, NFS3Status, NfsTime, SetAttr, WccData};
use crate::pipeline::PipelineError as Error;
use crate::xdr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub object: FileHandle,
    pub new_attributes: SetAttr,
    /// `sattrguard3`: if present, the operation is rejected with
    /// `NFS3ERR_NOT_SYNC` unless the object's ctime matches.
    pub guard: Option<NfsTime>,
}

impl Call {
    pub fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        let object = FileHandle::read(buf)?;
        let new_attributes = SetAttr::read(buf)?;
        let guard = xdr::read_optional(buf, NfsTime::read)?;
        Ok(Call { object, new_attributes, guard })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: NFS3Status,
    pub object_wcc: WccData,
}

impl Reply {
    pub fn write(&self, buf: &mut impl BufMut) {
        self.status.write(buf);
        self.object_wcc.write(buf);
    }
}
