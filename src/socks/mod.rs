//! SOCKSv5 (RFC 1928) wire types shared by the client and server state
//! machines: the greeting/method-selection exchange, the address union,
//! and the request/response pair (spec §3.4/§6.4).
//!
//! Grounded on the pack's several from-scratch SOCKS5 implementations
//! for wire-level texture (`other_examples/feb165d3_..._socks5.rs`,
//! `other_examples/37368951_..._no_auth.rs`), rebased onto `bytes::{Buf,
//! BufMut}` and this crate's `xdr`-flavored unwind-on-partial-read
//! discipline rather than those examples' direct-socket reads.

pub mod client;
pub mod server;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::pipeline::PipelineError as Error;
use crate::xdr;

pub const SOCKS_VERSION: u8 = 5;

/// Hands the handler whatever bytes the transport produced, unparsed —
/// SOCKS messages aren't uniformly length-framed the way RPC fragments
/// are, so unlike [`crate::rpc::framing::FragmentCodec`] this codec does
/// no reassembly; [`client::SocksClientHandler`]/[`server::SocksServerHandler`]
/// accumulate and re-parse with the cursor-snapshot/restore discipline
/// of [`crate::xdr::parse_unwinding`] themselves.
#[derive(Debug, Default)]
pub(crate) struct PassthroughCodec;

impl Decoder for PassthroughCodec {
    type Item = Bytes;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, Error> {
        if src.is_empty() {
            return Ok(None);
        }
        Ok(Some(src.split().freeze()))
    }
}

impl Encoder<Bytes> for PassthroughCodec {
    type Error = Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_slice(&item);
        Ok(())
    }
}

/// Fired as a user event once a SOCKS handshake reaches `Active`
/// (spec §4.H/§4.I): carries any bytes that arrived past the final
/// handshake message so the consumer doesn't lose them.
#[derive(Debug)]
pub struct ProxyEstablished {
    pub trailing_bytes: Bytes,
}

/// A user event an application submits to push bytes through a SOCKS
/// handler before or after the handshake completes. Submitted before
/// `Active`, the bytes queue in the handler's `MarkedBuffer`; submitted
/// after, they write straight through. `completer` lets the handler
/// reject an out-of-order write (spec §4.I: `InvalidServerState`)
/// instead of silently queueing or dropping it.
pub struct ApplicationWrite {
    pub data: Bytes,
    pub completer: crate::pipeline::promise::Completer<()>,
}

impl std::fmt::Debug for ApplicationWrite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationWrite").field("len", &self.data.len()).finish()
    }
}

/// `AuthenticationMethod` — spec §3.4. A raw `u8` newtype with the four
/// values this crate recognises; any other byte is
/// `InvalidAuthenticationSelection`/folded into `NoAcceptable` at the
/// greeting-selection call site, never rejected while merely decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthenticationMethod {
    None,
    Gssapi,
    UserPass,
    NoAcceptable,
}

impl AuthenticationMethod {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0x00 => AuthenticationMethod::None,
            0x01 => AuthenticationMethod::Gssapi,
            0x02 => AuthenticationMethod::UserPass,
            _ => AuthenticationMethod::NoAcceptable,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            AuthenticationMethod::None => 0x00,
            AuthenticationMethod::Gssapi => 0x01,
            AuthenticationMethod::UserPass => 0x02,
            AuthenticationMethod::NoAcceptable => 0xFF,
        }
    }
}

fn check_version(buf: &mut impl Buf) -> Result<(), Error> {
    let version = xdr::read_u8(buf)?;
    if version != SOCKS_VERSION {
        return Err(Error::InvalidProtocolVersion(version));
    }
    Ok(())
}

fn check_reserved(buf: &mut impl Buf) -> Result<(), Error> {
    let reserved = xdr::read_u8(buf)?;
    if reserved != 0 {
        return Err(Error::InvalidReservedByte(reserved));
    }
    Ok(())
}

/// `{version:5, methods}` — the client's opening greeting (RFC 1928
/// §3). `methods` is 1..=255 entries, each a raw `u8` preserved as
/// [`AuthenticationMethod`] (an unrecognised byte becomes
/// `NoAcceptable`, never a decode failure — the server decides
/// acceptability, not the decoder).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientGreeting {
    pub methods: Vec<AuthenticationMethod>,
}

impl ClientGreeting {
    pub fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        check_version(buf)?;
        let count = xdr::read_u8(buf)? as usize;
        if buf.remaining() < count {
            return Err(Error::Xdr(xdr::Error::TooShort));
        }
        let methods = (0..count).map(|_| AuthenticationMethod::from_u8(buf.get_u8())).collect();
        Ok(ClientGreeting { methods })
    }

    pub fn write(&self, buf: &mut impl BufMut) {
        buf.put_u8(SOCKS_VERSION);
        buf.put_u8(self.methods.len() as u8);
        for method in &self.methods {
            buf.put_u8(method.to_u8());
        }
    }
}

/// `{version:5, method}` — the server's reply to [`ClientGreeting`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectedAuthenticationMethod {
    pub method: AuthenticationMethod,
}

impl SelectedAuthenticationMethod {
    pub fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        check_version(buf)?;
        Ok(SelectedAuthenticationMethod { method: AuthenticationMethod::from_u8(xdr::read_u8(buf)?) })
    }

    pub fn write(&self, buf: &mut impl BufMut) {
        buf.put_u8(SOCKS_VERSION);
        buf.put_u8(self.method.to_u8());
    }
}

pub const ADDR_TYPE_IPV4: u8 = 1;
pub const ADDR_TYPE_DOMAIN: u8 = 3;
pub const ADDR_TYPE_IPV6: u8 = 4;

pub const MAX_DOMAIN_LEN: usize = 255;

/// RFC 1928 §5's address union: IPv4, a length-prefixed ASCII domain
/// name, or IPv6, each carrying a port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocksAddress {
    V4 { addr: [u8; 4], port: u16 },
    Domain { name: String, port: u16 },
    V6 { addr: [u8; 16], port: u16 },
}

impl SocksAddress {
    /// The constructor-time guard of spec §4.H: a SOCKS target cannot be
    /// a UNIX domain socket path. `SocketAddr` already excludes that
    /// possibility; this only rejects a domain name shaped like an
    /// absolute filesystem path, which no legitimate SOCKS target is.
    pub fn domain(name: impl Into<String>, port: u16) -> Result<Self, Error> {
        let name = name.into();
        if name.starts_with('/') {
            return Err(Error::InvalidAddressType(ADDR_TYPE_DOMAIN));
        }
        Ok(SocksAddress::Domain { name, port })
    }

    pub fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        match xdr::read_u8(buf)? {
            ADDR_TYPE_IPV4 => {
                if buf.remaining() < 6 {
                    return Err(Error::Xdr(xdr::Error::TooShort));
                }
                let mut addr = [0u8; 4];
                buf.copy_to_slice(&mut addr);
                let port = buf.get_u16();
                Ok(SocksAddress::V4 { addr, port })
            }
            ADDR_TYPE_DOMAIN => {
                let len = xdr::read_u8(buf)? as usize;
                if buf.remaining() < len + 2 {
                    return Err(Error::Xdr(xdr::Error::TooShort));
                }
                let mut name_bytes = vec![0u8; len];
                buf.copy_to_slice(&mut name_bytes);
                let name = String::from_utf8(name_bytes).map_err(|_| Error::UnexpectedRead)?;
                let port = buf.get_u16();
                Ok(SocksAddress::Domain { name, port })
            }
            ADDR_TYPE_IPV6 => {
                if buf.remaining() < 18 {
                    return Err(Error::Xdr(xdr::Error::TooShort));
                }
                let mut addr = [0u8; 16];
                buf.copy_to_slice(&mut addr);
                let port = buf.get_u16();
                Ok(SocksAddress::V6 { addr, port })
            }
            other => Err(Error::InvalidAddressType(other)),
        }
    }

    pub fn write(&self, buf: &mut impl BufMut) {
        match self {
            SocksAddress::V4 { addr, port } => {
                buf.put_u8(ADDR_TYPE_IPV4);
                buf.put_slice(addr);
                buf.put_u16(*port);
            }
            SocksAddress::Domain { name, port } => {
                buf.put_u8(ADDR_TYPE_DOMAIN);
                buf.put_u8(name.len() as u8);
                buf.put_slice(name.as_bytes());
                buf.put_u16(*port);
            }
            SocksAddress::V6 { addr, port } => {
                buf.put_u8(ADDR_TYPE_IPV6);
                buf.put_slice(addr);
                buf.put_u16(*port);
            }
        }
    }
}

/// A SOCKS command (RFC 1928 §4). UDP ASSOCIATE is recognised but never
/// driven end to end (spec §6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocksCommand {
    Connect,
    Bind,
    UdpAssociate,
}

impl SocksCommand {
    fn from_u8(v: u8) -> Result<Self, Error> {
        match v {
            1 => Ok(SocksCommand::Connect),
            2 => Ok(SocksCommand::Bind),
            3 => Ok(SocksCommand::UdpAssociate),
            other => Err(Error::InvalidAddressType(other)),
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            SocksCommand::Connect => 1,
            SocksCommand::Bind => 2,
            SocksCommand::UdpAssociate => 3,
        }
    }
}

/// `{version:5, command, reserved:0, address}` — RFC 1928 §4.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocksRequest {
    pub command: SocksCommand,
    pub address: SocksAddress,
}

impl SocksRequest {
    pub fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        check_version(buf)?;
        let command = SocksCommand::from_u8(xdr::read_u8(buf)?)?;
        check_reserved(buf)?;
        let address = SocksAddress::read(buf)?;
        Ok(SocksRequest { command, address })
    }

    pub fn write(&self, buf: &mut impl BufMut) {
        buf.put_u8(SOCKS_VERSION);
        buf.put_u8(self.command.to_u8());
        buf.put_u8(0);
        self.address.write(buf);
    }
}

/// RFC 1928 §6's reply codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocksReply {
    Succeeded,
    ServerFailure,
    NotAllowed,
    NetworkUnreachable,
    HostUnreachable,
    ConnectionRefused,
    TtlExpired,
    CommandNotSupported,
    AddressTypeNotSupported,
}

impl SocksReply {
    fn from_u8(v: u8) -> Result<Self, Error> {
        match v {
            0 => Ok(SocksReply::Succeeded),
            1 => Ok(SocksReply::ServerFailure),
            2 => Ok(SocksReply::NotAllowed),
            3 => Ok(SocksReply::NetworkUnreachable),
            4 => Ok(SocksReply::HostUnreachable),
            5 => Ok(SocksReply::ConnectionRefused),
            6 => Ok(SocksReply::TtlExpired),
            7 => Ok(SocksReply::CommandNotSupported),
            8 => Ok(SocksReply::AddressTypeNotSupported),
            other => Err(Error::ConnectionFailed(other)),
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            SocksReply::Succeeded => 0,
            SocksReply::ServerFailure => 1,
            SocksReply::NotAllowed => 2,
            SocksReply::NetworkUnreachable => 3,
            SocksReply::HostUnreachable => 4,
            SocksReply::ConnectionRefused => 5,
            SocksReply::TtlExpired => 6,
            SocksReply::CommandNotSupported => 7,
            SocksReply::AddressTypeNotSupported => 8,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, SocksReply::Succeeded)
    }
}

/// `{version:5, reply, reserved:0, bound_address}` — RFC 1928 §6.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocksResponse {
    pub reply: SocksReply,
    pub bound_address: SocksAddress,
}

impl SocksResponse {
    pub fn read(buf: &mut impl Buf) -> Result<Self, Error> {
        check_version(buf)?;
        let reply = SocksReply::from_u8(xdr::read_u8(buf)?)?;
        check_reserved(buf)?;
        let bound_address = SocksAddress::read(buf)?;
        Ok(SocksResponse { reply, bound_address })
    }

    pub fn write(&self, buf: &mut impl BufMut) {
        buf.put_u8(SOCKS_VERSION);
        buf.put_u8(self.reply.to_u8());
        buf.put_u8(0);
        self.bound_address.write(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn client_greeting_with_only_none_required_round_trips() {
        let greeting = ClientGreeting { methods: vec![AuthenticationMethod::None] };
        let mut out = BytesMut::new();
        greeting.write(&mut out);
        assert_eq!(&out[..], &[0x05, 0x01, 0x00]);
        let mut cursor = &out[..];
        assert_eq!(ClientGreeting::read(&mut cursor).unwrap(), greeting);
    }

    #[test]
    fn selected_method_none_round_trips() {
        let selected = SelectedAuthenticationMethod { method: AuthenticationMethod::None };
        let mut out = BytesMut::new();
        selected.write(&mut out);
        assert_eq!(&out[..], &[0x05, 0x00]);
    }

    #[test]
    fn connect_request_to_ipv4_round_trips_scenario_bytes() {
        let request = SocksRequest {
            command: SocksCommand::Connect,
            address: SocksAddress::V4 { addr: [0x5d, 0xb8, 0xd8, 0x22], port: 80 },
        };
        let mut out = BytesMut::new();
        request.write(&mut out);
        assert_eq!(&out[..], &[0x05, 0x01, 0x00, 0x01, 0x5d, 0xb8, 0xd8, 0x22, 0x00, 0x50]);
    }

    #[test]
    fn success_response_bound_zero_round_trips_scenario_bytes() {
        let response = SocksResponse {
            reply: SocksReply::Succeeded,
            bound_address: SocksAddress::V4 { addr: [0, 0, 0, 0], port: 0 },
        };
        let mut out = BytesMut::new();
        response.write(&mut out);
        assert_eq!(&out[..], &[0x05, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn rejects_non_version_5() {
        let mut out = BytesMut::new();
        out.extend_from_slice(&[0x04, 0x01, 0x00]);
        let mut cursor = &out[..];
        assert_eq!(ClientGreeting::read(&mut cursor), Err(Error::InvalidProtocolVersion(4)));
    }

    #[test]
    fn rejects_nonzero_reserved_byte() {
        let mut out = BytesMut::new();
        out.extend_from_slice(&[0x05, 0x01, 0x01, 0x01, 0, 0, 0, 0, 0, 0]);
        let mut cursor = &out[..];
        assert_eq!(SocksRequest::read(&mut cursor), Err(Error::InvalidReservedByte(1)));
    }

    #[test]
    fn domain_rejects_absolute_path() {
        assert!(SocksAddress::domain("/tmp/sock", 0).is_err());
    }

    proptest::proptest! {
        /// Property 6 (spec §8): decoding a `SocksRequest` whose
        /// reserved byte is anything but 0 always fails with
        /// `InvalidReservedByte`, whatever the command/address bytes
        /// that follow.
        #[test]
        fn prop_reserved_byte_guard(
            reserved in 1u8..=255,
            command in 1u8..=3,
        ) {
            let mut out = BytesMut::new();
            out.put_u8(SOCKS_VERSION);
            out.put_u8(command);
            out.put_u8(reserved);
            out.put_u8(ADDR_TYPE_IPV4);
            out.extend_from_slice(&[0u8; 6]);
            let mut cursor = &out[..];
            prop_assert_eq!(SocksRequest::read(&mut cursor), Err(Error::InvalidReservedByte(reserved)));
        }

        /// Property 1 (spec §8): any `SocksRequest` round-trips through
        /// encode then decode unchanged.
        #[test]
        fn prop_request_round_trips(
            command in 1u8..=3,
            addr in proptest::prelude::any::<[u8; 4]>(),
            port in proptest::prelude::any::<u16>(),
        ) {
            let request = SocksRequest {
                command: SocksCommand::from_u8(command).unwrap(),
                address: SocksAddress::V4 { addr, port },
            };
            let mut out = BytesMut::new();
            request.write(&mut out);
            let mut cursor = &out[..];
            prop_assert_eq!(SocksRequest::read(&mut cursor).unwrap(), request);
        }
    }
}
