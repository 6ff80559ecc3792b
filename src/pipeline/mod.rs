//! The transport-agnostic channel/handler runtime every protocol in this
//! crate is built on (spec §4.A, §5).
//!
//! A [`channel::spawn`] call owns one transport for its lifetime, runs a
//! byte-to-message [`Decoder`](tokio_util::codec::Decoder)/[`Encoder`](tokio_util::codec::Encoder)
//! codec over it, and drives exactly one [`handler::Handler`] with the
//! decoded messages. There is no dynamic chain of handlers: every
//! concrete pipeline this crate builds (RPC dispatch, a SOCKS client, a
//! SOCKS server) is "one codec stage, one handler", so that's the shape
//! wired in directly.

pub mod buffer;
pub mod channel;
pub mod context;
pub mod handler;
pub mod promise;

use thiserror::Error;

/// Errors raised by the channel runtime itself, as opposed to whatever
/// application-level error a protocol codec produces (those convert into
/// this type at the `Channel` boundary; see spec §7).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The channel was closed (transport EOF, explicit `Context::close`,
    /// or the channel task exited) while a write or wait was pending.
    #[error("channel closed")]
    ChannelClosed,

    /// A length-prefixed RPC fragment declared a length above the
    /// configured maximum (spec §4.D, REDESIGN FLAG #4).
    #[error("rpc fragment length {0} exceeds configured maximum {1}")]
    FragmentTooLong(u32, u32),

    /// Fewer than 4 bytes were available to read a fragment header.
    #[error("rpc fragment header truncated")]
    FragmentHeaderTooShort,

    /// An RPC message was shorter than the minimum legal RPC message.
    #[error("rpc message too short to be legal")]
    IllegalRpcTooShort,

    /// The `msg_type` discriminant in an RPC message was neither CALL
    /// nor REPLY.
    #[error("unknown rpc message type {0}")]
    UnknownMessageType(u32),

    /// An RPC call declared an `rpcvers` other than 2.
    #[error("unknown rpc version {0}")]
    UnknownRpcVersion(u32),

    /// An `opaque_auth` verifier flavor this crate does not implement.
    #[error("unknown auth flavor {0}")]
    UnknownVerifier(u32),

    /// The `reply_stat` discriminant in an RPC reply was neither
    /// MSG_ACCEPTED nor MSG_DENIED.
    #[error("illegal rpc reply status {0}")]
    IllegalReplyStatus(u32),

    /// A reply's xid did not correlate to any outstanding call.
    #[error("unknown rpc xid {0}")]
    UnknownXID(u32),

    /// A call's (program, version, procedure) triple is not served.
    #[error("unknown program, version, or procedure")]
    UnknownProgramOrProcedure,

    /// An underlying XDR decode error (bad padding, truncated opaque,
    /// oversized string/array, ...).
    #[error(transparent)]
    Xdr(#[from] crate::xdr::Error),

    /// An `fattr3.type` discriminant outside `{1..=7}`.
    #[error("invalid nfs3 file type {0}")]
    InvalidFileType(u32),

    /// An `nfsstat3` this crate does not recognize at all (distinct from
    /// [`NFS3Status::Other`](crate::nfs3::NFS3Status::Other), which is a
    /// deliberately-open catch-all for encoding; this variant is for
    /// wire shapes where a closed status set is actually required).
    #[error("invalid nfs3 status {0}")]
    InvalidStatus(u32),

    /// An FSINFO `properties` bitmask with bits set outside the FSF3_*
    /// range this crate knows about.
    #[error("invalid fsinfo properties bitmask")]
    InvalidFSInfoProperties,

    /// A file handle whose length exceeds `NFS3_FHSIZE`.
    #[error("invalid file handle length {0}")]
    InvalidFileHandleFormat(usize),

    /// The transport itself faulted.
    #[error("transport io error: {0}")]
    Io(String),

    /// A SOCKS client handler received a write request its state
    /// doesn't expect (spec §4.H/§7).
    #[error("invalid socks client state")]
    InvalidClientState,

    /// A SOCKS server handler received a write request its state
    /// doesn't expect (spec §4.I/§7).
    #[error("invalid socks server state")]
    InvalidServerState,

    /// A SOCKS message's version byte was not 5.
    #[error("invalid socks protocol version {0}")]
    InvalidProtocolVersion(u8),

    /// A SOCKS message's reserved byte was not 0.
    #[error("invalid socks reserved byte {0}")]
    InvalidReservedByte(u8),

    /// A `SocksAddress` tag outside `{1, 3, 4}`.
    #[error("invalid socks address type {0}")]
    InvalidAddressType(u8),

    /// The server selected an authentication method the client never
    /// offered.
    #[error("server selected unoffered authentication method {0}")]
    InvalidAuthenticationSelection(u8),

    /// The server's greeting response was `NO_ACCEPTABLE_METHODS`.
    #[error("no acceptable socks authentication method")]
    NoValidAuthenticationMethod,

    /// The SOCKS request failed; carries the server's reply code.
    #[error("socks connection failed with reply code {0}")]
    ConnectionFailed(u8),

    /// Bytes were read in a state that does not expect any.
    #[error("unexpected read in current socks state")]
    UnexpectedRead,

    /// A reply builder's own invariant didn't hold (e.g. an OK status
    /// whose mandatory field was `None`): caught by `debug_assert!` in
    /// debug builds, surfaced here instead of panicking in release
    /// (spec §9).
    #[error("protocol invariant violated: {0}")]
    ProtocolInvariantViolated(&'static str),
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::Io(e.to_string())
    }
}
