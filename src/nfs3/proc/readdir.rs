//! READDIR (procedure 16, RFC 1813 §3.3.16).
//!
//! Directory entries are a wire-level linked list (spec §4.F): each
//! entry is preceded by a `has_next` flag (1 before every entry, 0 after
//! the last), followed by the EOF flag. [`Reply`] presents this to Rust
//! callers as a plain `Vec<Entry>` and hides the list encoding in
//! [`Reply::read`]/[`Reply::write`].

use bytes::{Buf, BufMut};

use crate::nfs3::{read_post_op_attr, write_post_op_attr, FileAttr, FileHandle, NFS3Status, NFS3_COOKIEVERFSIZE};
use crate::pipeline::PipelineError as Error;
use crate::xdr;

pub type CookieVerf = [u8; NFS3_COOKIEVERFSIZE];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub dir: FileHandle,
    pub cookie: u64,
    pub cookieverf: CookieVerf,
    pub count: u32,
}

impl Call {
    pub fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        Ok(Call {
            dir: FileHandle::read(buf)?,
            cookie: xdr::read_u64(buf)?,
            cookieverf: xdr::read_array(buf)?,
            count: xdr::read_u32(buf)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub file_id: u64,
    pub name: String,
    pub cookie: u64,
}

impl Entry {
    fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        Ok(Entry {
            file_id: xdr::read_u64(buf)?,
            name: xdr::read_string(buf, crate::nfs3::MAX_NAME_LEN)?,
            cookie: xdr::read_u64(buf)?,
        })
    }

    fn write(&self, buf: &mut impl BufMut) {
        xdr::write_u64(buf, self.file_id);
        xdr::write_string(buf, &self.name);
        xdr::write_u64(buf, self.cookie);
    }
}

pub(crate) fn read_entry_list(buf: &mut impl Buf) -> Result<(Vec<Entry>, bool), Error> {
    let mut entries = Vec::new();
    while let Some(entry) = xdr::read_optional(buf, Entry::read)? {
        entries.push(entry);
    }
    let eof = xdr::read_bool(buf)?;
    Ok((entries, eof))
}

pub(crate) fn write_entry_list(buf: &mut impl BufMut, entries: &[impl EncodableEntry], eof: bool) {
    for entry in entries {
        xdr::write_bool(buf, true);
        entry.write_entry(buf);
    }
    xdr::write_bool(buf, false);
    xdr::write_bool(buf, eof);
}

/// Lets [`write_entry_list`] serve both [`Entry`] (READDIR) and
/// [`super::readdirplus::Entry`] (READDIRPLUS) without duplicating the
/// linked-list writer.
pub(crate) trait EncodableEntry {
    fn write_entry(&self, buf: &mut impl BufMut);
}

impl EncodableEntry for Entry {
    fn write_entry(&self, buf: &mut impl BufMut) {
        self.write(buf);
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
            return Ok(Reply { status, dir_attributes, cookieverf: [0; NFS3_COOKIEVERFSIZE], entries: Vec::new(), eof: false });
        }
        let cookieverf = xdr::read_array(buf)?;
        let (entries, eof) = read_entry_list(buf)?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn round_trips_two_entries_and_eof() {
        let reply = Reply {
            status: NFS3Status::Ok,
            dir_attributes: None,
            cookieverf: [0; NFS3_COOKIEVERFSIZE],
            entries: vec![
                Entry { file_id: 1, name: "a".into(), cookie: 1 },
                Entry { file_id: 2, name: "b".into(), cookie: 2 },
            ],
            eof: true,
        };
        let mut out = BytesMut::new();
        reply.write(&mut out);
        let mut cursor = &out[..];
        assert_eq!(Reply::read(&mut cursor).unwrap(), reply);
    }
}
