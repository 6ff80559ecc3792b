//! The MOUNT program (RFC 1813 §5): `null`, `mount`, `unmount` only
//! (spec §6.3) — `dump`, `export`, and `unmount all` are out of scope
//! and fall through to `PROC_UNAVAIL` like every other unlisted
//! procedure.

use bytes::{Buf, BufMut};

use crate::nfs3::FileHandle;
use crate::pipeline::PipelineError as Error;
use crate::xdr;

pub const NULL: u32 = 0;
pub const MNT: u32 = 1;
pub const UMNT: u32 = 3;

pub const MNT_PATH_LEN: usize = 1024;

/// `mountstat3` (RFC 1813 §5.2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountStatus {
    Ok,
    Perm,
    NoEnt,
    Io,
    Acces,
    NotDir,
    Inval,
    NameTooLong,
    NotSupp,
    ServerFault,
}

impl MountStatus {
    fn code(self) -> u32 {
        match self {
            MountStatus::Ok => 0,
            MountStatus::Perm => 1,
            MountStatus::NoEnt => 2,
            MountStatus::Io => 5,
            MountStatus::Acces => 13,
            MountStatus::NotDir => 20,
            MountStatus::Inval => 22,
            MountStatus::NameTooLong => 63,
            MountStatus::NotSupp => 10_004,
            MountStatus::ServerFault => 10_006,
        }
    }

    pub fn is_ok(self) -> bool {
        matches!(self, MountStatus::Ok)
    }

    pub fn write(self, buf: &mut impl BufMut) {
        xdr::write_u32(buf, self.code());
    }
}

pub mod mnt {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Call {
        pub dirpath: String,
    }

    impl Call {
        pub fn read(buf: &mut impl Buf) -> Result<Self, Error> {
            Ok(Call { dirpath: xdr::read_string(buf, MNT_PATH_LEN)? })
        }
    }

    /// AUTH_SYS(1) is the only flavor this crate ever advertises.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Reply {
        pub status: MountStatus,
        pub file_handle: Option<FileHandle>,
        pub auth_flavors: Vec<u32>,
    }

    impl Reply {
        pub fn write(&self, buf: &mut impl BufMut) -> Result<(), Error> {
            self.status.write(buf);
            if !self.status.is_ok() {
                return Ok(());
            }
            debug_assert!(self.file_handle.is_some(), "ok mnt reply without file handle");
            let fh = self
                .file_handle
                .as_ref()
                .ok_or(Error::ProtocolInvariantViolated("ok mnt reply without file handle"))?;
            xdr::write_blob(buf, &fh.0);
            xdr::write_u32(buf, self.auth_flavors.len() as u32);
            for flavor in &self.auth_flavors {
                xdr::write_u32(buf, *flavor);
            }
            Ok(())
        }
    }
}

pub mod umnt {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Call {
        pub dirpath: String,
    }

    impl Call {
        pub fn read(buf: &mut impl Buf) -> Result<Self, Error> {
            Ok(Call { dirpath: xdr::read_string(buf, MNT_PATH_LEN)? })
        }
    }

    /// UMNT has no reply body (RFC 1813 §5.2.3) — its RPC reply is the
    /// bare accepted/`SUCCESS` status with no further bytes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Reply;
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn mnt_call_reads_dirpath() {
        let mut out = BytesMut::new();
        xdr::write_string(&mut out, "/export");
        let mut cursor = &out[..];
        assert_eq!(mnt::Call::read(&mut cursor).unwrap().dirpath, "/export");
    }

    #[test]
    fn mnt_failure_reply_writes_only_status() {
        let reply = mnt::Reply { status: MountStatus::Acces, file_handle: None, auth_flavors: vec![] };
        let mut out = BytesMut::new();
        reply.write(&mut out).unwrap();
        assert_eq!(out.len(), 4);
    }
}
