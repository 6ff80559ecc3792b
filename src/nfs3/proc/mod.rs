//! One file per supported NFS3 procedure (spec §4.F, §6.3): call struct,
//! reply struct, and `read_call`/`write_call`/`read_reply`/`write_reply`
//! functions together, since within this crate a procedure's call is
//! always decoded and its reply always encoded by the same dispatch
//! role.

pub mod access;
pub mod fsinfo;
pub mod fsstat;
pub mod getattr;
pub mod lookup;
pub mod pathconf;
pub mod read;
pub mod readdir;
pub mod readdirplus;
pub mod readlink;
pub mod setattr;

/// NFS3 procedure numbers this crate dispatches (spec §6.3). Every other
/// value answers `PROC_UNAVAIL`.
pub const NULL: u32 = 0;
pub const GETATTR: u32 = 1;
pub const SETATTR: u32 = 2;
pub const LOOKUP: u32 = 3;
pub const ACCESS: u32 = 4;
pub const READLINK: u32 = 5;
pub const READ: u32 = 6;
pub const READDIR: u32 = 16;
pub const READDIRPLUS: u32 = 17;
pub const FSSTAT: u32 = 18;
pub const FSINFO: u32 = 19;
pub const PATHCONF: u32 = 20;
