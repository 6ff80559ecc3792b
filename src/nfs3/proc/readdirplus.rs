//! READDIRPLUS (procedure 17, RFC 1813 §3.3.17) — as READDIR, but each
//! entry inlines attributes and a file handle.

use bytes::{Buf, BufMut};

use crate::nfs3::proc::readdir::{write_entry_list, CookieVerf, EncodableEntry};
use crate::nfs3::{read_post_op_attr, write_post_op_attr, FileAttr, FileHandle, NFS3Status, NFS3_COOKIEVERFSIZE};
use crate::pipeline::PipelineError as Error;
use crate::xdr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub dir: FileHandle,
    pub cookie: u64,
    pub cookieverf: CookieVerf,
    pub dir_count: u32,
    pub max_count: u32,
}

impl Call {
    pub fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        Ok(Call {
            dir: FileHandle::read(buf)?,
            cookie: xdr::read_u64(buf)?,
            cookieverf: xdr::read_array(buf)?,
            dir_count: xdr::read_u32(buf)?,
            max_count: xdr::read_u32(buf)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub file_id: u64,
    pub name: String,
    pub cookie: u64,
    pub name_attributes: Option<FileAttr>,
    pub name_handle: Option<FileHandle>,
}

impl Entry {
    fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        Ok(Entry {
            file_id: xdr::read_u64(buf)?,
            name: xdr::read_string(buf, crate::nfs3::MAX_NAME_LEN)?,
            cookie: xdr::read_u64(buf)?,
            name_attributes: read_post_op_attr(buf)?,
            name_handle: xdr::read_optional(buf, FileHandle::read)?,
        })
    }
}

impl EncodableEntry for Entry {
    fn write_entry(&self, buf: &mut impl BufMut) {
        xdr::write_u64(buf, self.file_id);
        xdr::write_string(buf, &self.name);
        xdr::write_u64(buf, self.cookie);
        write_post_op_attr(buf, &self.name_attributes);
        xdr::write_optional(buf, self.name_handle.clone(), |b, v| v.write(b));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: NFS3Status,
    pub dir_attributes: Option<FileAttr>,
    pub cookieverf: CookieVerf,
    pub entries: Vec<Entry>,
    pub eof: bool,
}

impl Reply {
    pub fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        let status = NFS3Status::read(buf)?;
        let dir_attributes = read_post_op_attr(buf)?;
        if !status.is_ok() {
            return Ok(Reply {
                status,
                dir_attributes,
                cookieverf: [0; NFS3_COOKIEVERFSIZE],
                entries: Vec::new(),
                eof: false,
            });
        }
        let cookieverf = xdr::read_array(buf)?;
        let mut entries = Vec::new();
        while let Some(entry) = xdr::read_optional(buf, Entry::read)? {
            entries.push(entry);
        }
        let eof = xdr::read_bool(buf)?;
        Ok(Reply { status, dir_attributes, cookieverf, entries, eof })
    }

    pub fn write(&self, buf: &mut impl BufMut) {
        self.status.write(buf);
        write_post_op_attr(buf, &self.dir_attributes);
        if !self.status.is_ok() {
            return;
        }
        xdr::write_array(buf, &self.cookieverf);
        write_entry_list(buf, &self.entries, self.eof);
    }
}
