//! NFSv3/MOUNT (RFC 1813) message types and codec (spec §3.3, §4.F).
//!
//! Shared value types live here; one file per supported procedure lives
//! under [`proc`], grounded on the teacher's `nfsv3.rs` field layout
//! renamed to idiomatic Rust, and the teacher's
//! `parser::nfsv3`/`serializer::nfs` per-procedure split merged into a
//! single call+reply+codec file per procedure (both directions of a
//! procedure are always handled by this crate's one server role, unlike
//! the teacher's client+server split).

pub mod dispatch;
pub mod mount;
pub mod proc;

use bytes::{Buf, BufMut};

use crate::pipeline::PipelineError as Error;
use crate::xdr;

pub const NFS_PROGRAM: u32 = 100_003;
pub const NFS_VERSION: u32 = 3;
pub const MOUNT_PROGRAM: u32 = 100_005;
pub const MOUNT_VERSION: u32 = 3;

pub const NFS3_FHSIZE: usize = 64;
pub const NFS3_COOKIEVERFSIZE: usize = 8;

/// Opaque, server-issued file identifier (spec §3.3 `FileHandle`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileHandle(pub Vec<u8>);

impl FileHandle {
    pub fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        Ok(FileHandle(xdr::read_blob(buf, NFS3_FHSIZE)?))
    }

    pub fn write(&self, buf: &mut impl BufMut) {
        xdr::write_blob(buf, &self.0);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Regular,
    Directory,
    BlockDevice,
    CharacterDevice,
    Symlink,
    Socket,
    Fifo,
}

impl FileType {
    fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        match xdr::read_u32(buf)? {
            1 => Ok(FileType::Regular),
            2 => Ok(FileType::Directory),
            3 => Ok(FileType::BlockDevice),
            4 => Ok(FileType::CharacterDevice),
            5 => Ok(FileType::Symlink),
            6 => Ok(FileType::Socket),
            7 => Ok(FileType::Fifo),
            other => Err(Error::InvalidFileType(other)),
        }
    }

    fn write(&self, buf: &mut impl BufMut) {
        let v: u32 = match self {
            FileType::Regular => 1,
            FileType::Directory => 2,
            FileType::BlockDevice => 3,
            FileType::CharacterDevice => 4,
            FileType::Symlink => 5,
            FileType::Socket => 6,
            FileType::Fifo => 7,
        };
        xdr::write_u32(buf, v);
    }
}

/// `{seconds, nanoseconds}` (spec §3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NfsTime {
    pub seconds: u32,
    pub nanoseconds: u32,
}

impl NfsTime {
    pub fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        Ok(NfsTime { seconds: xdr::read_u32(buf)?, nanoseconds: xdr::read_u32(buf)? })
    }

    pub fn write(&self, buf: &mut impl BufMut) {
        xdr::write_u32(buf, self.seconds);
        xdr::write_u32(buf, self.nanoseconds);
    }
}

/// `specdata3`: major/minor device pair for block/char special files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecData {
    pub major: u32,
    pub minor: u32,
}

impl SpecData {
    fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        Ok(SpecData { major: xdr::read_u32(buf)?, minor: xdr::read_u32(buf)? })
    }

    fn write(&self, buf: &mut impl BufMut) {
        xdr::write_u32(buf, self.major);
        xdr::write_u32(buf, self.minor);
    }
}

/// `fattr3` (spec §3.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttr {
    pub file_type: FileType,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub used: u64,
    pub rdev: SpecData,
    pub fsid: u64,
    pub fileid: u64,
    pub atime: NfsTime,
    pub mtime: NfsTime,
    pub ctime: NfsTime,
}

impl FileAttr {
    pub fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        Ok(FileAttr {
            file_type: FileType::read(buf)?,
            mode: xdr::read_u32(buf)?,
            nlink: xdr::read_u32(buf)?,
            uid: xdr::read_u32(buf)?,
            gid: xdr::read_u32(buf)?,
            size: xdr::read_u64(buf)?,
            used: xdr::read_u64(buf)?,
            rdev: SpecData::read(buf)?,
            fsid: xdr::read_u64(buf)?,
            fileid: xdr::read_u64(buf)?,
            atime: NfsTime::read(buf)?,
            mtime: NfsTime::read(buf)?,
            ctime: NfsTime::read(buf)?,
        })
    }

    pub fn write(&self, buf: &mut impl BufMut) {
        self.file_type.write(buf);
        xdr::write_u32(buf, self.mode);
        xdr::write_u32(buf, self.nlink);
        xdr::write_u32(buf, self.uid);
        xdr::write_u32(buf, self.gid);
        xdr::write_u64(buf, self.size);
        xdr::write_u64(buf, self.used);
        self.rdev.write(buf);
        xdr::write_u64(buf, self.fsid);
        xdr::write_u64(buf, self.fileid);
        self.atime.write(buf);
        self.mtime.write(buf);
        self.ctime.write(buf);
    }
}

/// `post_op_attr`: optional attributes following a reply.
pub fn read_post_op_attr(buf: &mut impl Buf) -> Result<Option<FileAttr>, Error> {
    xdr::read_optional(buf, FileAttr::read)
}

pub fn write_post_op_attr(buf: &mut impl BufMut, attr: &Option<FileAttr>) {
    xdr::write_optional(buf, attr.clone(), |b, v| v.write(b));
}

/// `wcc_attr`: the subset of attributes needed for weak cache consistency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WccAttr {
    pub size: u64,
    pub mtime: NfsTime,
    pub ctime: NfsTime,
}

impl WccAttr {
    fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        Ok(WccAttr {
            size: xdr::read_u64(buf)?,
            mtime: NfsTime::read(buf)?,
            ctime: NfsTime::read(buf)?,
        })
    }

    fn write(&self, buf: &mut impl BufMut) {
        xdr::write_u64(buf, self.size);
        self.mtime.write(buf);
        self.ctime.write(buf);
    }
}

/// `wcc_data`: `{before: pre_op_attr, after: post_op_attr}` (spec §3.3).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WccData {
    pub before: Option<WccAttr>,
    pub after: Option<FileAttr>,
}

impl WccData {
    pub fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        let before = xdr::read_optional(buf, WccAttr::read)?;
        let after = read_post_op_attr(buf)?;
        Ok(WccData { before, after })
    }

    pub fn write(&self, buf: &mut impl BufMut) {
        xdr::write_optional(buf, self.before, |b, v| v.write(b));
        write_post_op_attr(buf, &self.after);
    }
}

/// `sattr3`: attribute modification mask for SETATTR (spec §6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetTime {
    DontChange,
    SetToServerTime,
    SetToClientTime(NfsTime),
}

impl SetTime {
    fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        match xdr::read_u32(buf)? {
            0 => Ok(SetTime::DontChange),
            1 => Ok(SetTime::SetToServerTime),
            2 => Ok(SetTime::SetToClientTime(NfsTime::read(buf)?)),
            other => Err(Error::Xdr(xdr::Error::BadDiscriminant(other))),
        }
    }

    fn write(&self, buf: &mut impl BufMut) {
        match self {
            SetTime::DontChange => xdr::write_u32(buf, 0),
            SetTime::SetToServerTime => xdr::write_u32(buf, 1),
            SetTime::SetToClientTime(t) => {
                xdr::write_u32(buf, 2);
                t.write(buf);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetAttr {
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub size: Option<u64>,
    pub atime: SetTime,
    pub mtime: SetTime,
}

impl SetAttr {
    pub fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        Ok(SetAttr {
            mode: xdr::read_optional(buf, xdr::read_u32)?,
            uid: xdr::read_optional(buf, xdr::read_u32)?,
            gid: xdr::read_optional(buf, xdr::read_u32)?,
            size: xdr::read_optional(buf, xdr::read_u64)?,
            atime: SetTime::read(buf)?,
            mtime: SetTime::read(buf)?,
        })
    }

    pub fn write(&self, buf: &mut impl BufMut) {
        xdr::write_optional(buf, self.mode, xdr::write_u32);
        xdr::write_optional(buf, self.uid, xdr::write_u32);
        xdr::write_optional(buf, self.gid, xdr::write_u32);
        xdr::write_optional(buf, self.size, xdr::write_u64);
        self.atime.write(buf);
        self.mtime.write(buf);
    }
}

/// `diropargs3`: `{dir, name}`, the argument shape shared by LOOKUP and
/// the create-family procedures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirOpArgs {
    pub dir: FileHandle,
    pub name: String,
}

pub const MAX_NAME_LEN: usize = 255;
pub const MAX_PATH_LEN: usize = 1024;
pub const MAX_READ_LEN: usize = 64 * 1024 * 1024;

impl DirOpArgs {
    pub fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        let dir = FileHandle::read(buf)?;
        let name = xdr::read_string(buf, MAX_NAME_LEN)?;
        Ok(DirOpArgs { dir, name })
    }

    pub fn write(&self, buf: &mut impl BufMut) {
        self.dir.write(buf);
        xdr::write_string(buf, &self.name);
    }
}

/// `nfsstat3` — spec §6.3's status table. Only the values called out by
/// the specification are named explicitly; any other status value this
/// crate needs to produce is still a plain `u32` via [`NFS3Status::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NFS3Status {
    Ok,
    Perm,
    NoEnt,
    Io,
    Acces,
    Exist,
    NotDir,
    IsDir,
    Inval,
    FBig,
    NameTooLong,
    NotEmpty,
    BadHandle,
    Rofs,
    Other(u32),
}

impl NFS3Status {
    pub fn code(self) -> u32 {
        match self {
            NFS3Status::Ok => 0,
            NFS3Status::Perm => 1,
            NFS3Status::NoEnt => 2,
            NFS3Status::Io => 5,
            NFS3Status::Acces => 13,
            NFS3Status::Exist => 17,
            NFS3Status::NotDir => 20,
            NFS3Status::IsDir => 21,
            NFS3Status::Inval => 22,
            NFS3Status::FBig => 27,
            NFS3Status::Rofs => 30,
            NFS3Status::NameTooLong => 63,
            NFS3Status::NotEmpty => 66,
            NFS3Status::BadHandle => 10_001,
            NFS3Status::Other(v) => v,
        }
    }

    pub fn from_code(v: u32) -> Self {
        match v {
            0 => NFS3Status::Ok,
            1 => NFS3Status::Perm,
            2 => NFS3Status::NoEnt,
            5 => NFS3Status::Io,
            13 => NFS3Status::Acces,
            17 => NFS3Status::Exist,
            20 => NFS3Status::NotDir,
            21 => NFS3Status::IsDir,
            22 => NFS3Status::Inval,
            27 => NFS3Status::FBig,
            30 => NFS3Status::Rofs,
            63 => NFS3Status::NameTooLong,
            66 => NFS3Status::NotEmpty,
            10_001 => NFS3Status::BadHandle,
            other => NFS3Status::Other(other),
        }
    }

    pub fn is_ok(self) -> bool {
        matches!(self, NFS3Status::Ok)
    }

    pub fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        Ok(Self::from_code(xdr::read_u32(buf)?))
    }

    pub fn write(self, buf: &mut impl BufMut) {
        xdr::write_u32(buf, self.code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn file_attr_round_trips() {
        let attr = FileAttr {
            file_type: FileType::Regular,
            mode: 0o644,
            nlink: 1,
            uid: 0,
            gid: 0,
            size: 4096,
            used: 4096,
            rdev: SpecData { major: 0, minor: 0 },
            fsid: 1,
            fileid: 2,
            atime: NfsTime { seconds: 1, nanoseconds: 0 },
            mtime: NfsTime { seconds: 2, nanoseconds: 0 },
            ctime: NfsTime { seconds: 3, nanoseconds: 0 },
        };
        let mut out = BytesMut::new();
        attr.write(&mut out);
        let mut cursor = &out[..];
        assert_eq!(FileAttr::read(&mut cursor).unwrap(), attr);
    }

    #[test]
    fn status_other_roundtrips_unknown_codes() {
        assert_eq!(NFS3Status::from_code(10_008).code(), 10_008);
    }
}
