//! SOCKSv5 server handshake state machine (spec §4.I): receives the
//! client's greeting, selects (or refuses) an authentication method,
//! receives the CONNECT/BIND/UDP_ASSOCIATE request, replies, and once
//! the reply is away becomes a transparent byte pipe.
//!
//! Mirrors `client.rs`'s `step()`/`drive()` shape — same pack SOCKS5
//! examples as grounding, reworked for the server's side of the
//! handshake (select-or-refuse a method, answer with a bound address
//! instead of asking for one).

use std::any::Any;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tracing::trace;

use crate::pipeline::context::Context;
use crate::pipeline::handler::Handler;
use crate::pipeline::{self, PipelineError as Error};
use crate::socks::{
    AuthenticationMethod, ClientGreeting, PassthroughCodec, ProxyEstablished, SelectedAuthenticationMethod,
    SocksAddress, SocksReply, SocksRequest, SocksResponse,
};

/// Result of feeding bytes to a server-side authentication sub-protocol
/// (spec §4.I). Mirrors [`crate::socks::client::AuthResult`].
#[derive(Debug)]
pub enum AuthResult {
    NeedsMoreData,
    Respond(Bytes),
    Failed,
    Complete,
}

/// The SOCKS server's pluggable authentication backend (spec §4.I,
/// §6.5): picks a method from what the client offered, then drives
/// that method's exchange.
pub trait AuthenticationDelegate: Send + 'static {
    /// Returns the first method from `offered` this delegate accepts,
    /// or `None` if it accepts none of them — the handler then replies
    /// `NO_ACCEPTABLE` and closes the channel.
    fn select_method(&mut self, offered: &[AuthenticationMethod]) -> Option<AuthenticationMethod>;
    fn handle_incoming(&mut self, buf: &mut BytesMut) -> AuthResult;
}

/// Accepts only `NONE` — correct whenever the server requires no
/// authentication (spec §8 scenario 3).
#[derive(Debug, Default)]
pub struct NoAuthenticationDelegate;

impl AuthenticationDelegate for NoAuthenticationDelegate {
    fn select_method(&mut self, offered: &[AuthenticationMethod]) -> Option<AuthenticationMethod> {
        offered.contains(&AuthenticationMethod::None).then_some(AuthenticationMethod::None)
    }

    fn handle_incoming(&mut self, _buf: &mut BytesMut) -> AuthResult {
        AuthResult::Complete
    }
}

/// Resolves the bound address and reply code for an accepted
/// [`SocksRequest`] (spec §4.I) — the one piece of server behavior
/// that's actually specific to how upstream connections get made, kept
/// behind a trait so the handshake state machine doesn't need to know.
pub trait ConnectionBackend: Send + 'static {
    fn connect(&mut self, request: &SocksRequest) -> (SocksReply, SocksAddress);
}

/// Always reports success with an all-zero bound address — for tests
/// and for callers that only need the handshake itself driven, not a
/// real upstream connection made.
#[derive(Debug, Default)]
pub struct AcceptAllBackend;

impl ConnectionBackend for AcceptAllBackend {
    fn connect(&mut self, _request: &SocksRequest) -> (SocksReply, SocksAddress) {
        (SocksReply::Succeeded, SocksAddress::V4 { addr: [0, 0, 0, 0], port: 0 })
    }
}

/// Actions the state machine returns to [`SocksServerHandler::drive`]
/// (spec §4.I). `SendResponseAndEstablish`/`SendResponseAndClose` fold
/// "write the response" and "what happens next" into one variant since
/// the two are always decided together (the reply code itself decides
/// whether the channel goes `Active` or closes).
#[derive(Debug)]
pub enum Action {
    WaitForMoreData,
    SendSelectedMethod(SelectedAuthenticationMethod),
    RejectAndClose(SelectedAuthenticationMethod),
    Respond(Bytes),
    SendResponseAndEstablish(SocksResponse),
    SendResponseAndClose(SocksResponse),
    Failed(Error),
}

#[derive(Debug)]
enum ServerState {
    Inactive,
    WaitForClientGreeting,
    PendingAuthentication { selected: AuthenticationMethod },
    Authenticating,
    WaitForClientRequest,
    Active,
}

fn needs_more_data(err: &Error) -> bool {
    matches!(err, Error::Xdr(crate::xdr::Error::TooShort))
}

/// Drives the server-side handshake of spec §4.I over a [`Context`].
pub struct SocksServerHandler {
    state: ServerState,
    auth: Box<dyn AuthenticationDelegate>,
    backend: Box<dyn ConnectionBackend>,
    recv_buf: BytesMut,
}

impl SocksServerHandler {
    pub fn new(auth: impl AuthenticationDelegate, backend: impl ConnectionBackend) -> Self {
        Self { state: ServerState::Inactive, auth: Box::new(auth), backend: Box::new(backend), recv_buf: BytesMut::new() }
    }

    /// Logs and applies a state transition (spec §12: SOCKS state
    /// transitions log at `trace`).
    fn transition(&mut self, to: ServerState) {
        trace!(from = ?self.state, to = ?to, "socks server state transition");
        self.state = to;
    }

    /// Computes the next [`Action`] from the current state and whatever
    /// bytes are buffered, without performing any I/O itself — the
    /// caller ([`Self::drive`]) acts on it. Mirrors the state diagram of
    /// spec §4.I one transition at a time.
    fn step(&mut self) -> Action {
        match &self.state {
            ServerState::Inactive => {
                self.transition(ServerState::WaitForClientGreeting);
                Action::WaitForMoreData
            }
            ServerState::WaitForClientGreeting => {
                let mut cursor: &[u8] = &self.recv_buf[..];
                match ClientGreeting::read(&mut cursor) {
                    Ok(greeting) => {
                        let consumed = self.recv_buf.len() - cursor.len();
                        self.recv_buf.advance(consumed);
                        match self.auth.select_method(&greeting.methods) {
                            Some(method) => {
                                self.transition(ServerState::PendingAuthentication { selected: method });
                                Action::SendSelectedMethod(SelectedAuthenticationMethod { method })
                            }
                            None => Action::RejectAndClose(SelectedAuthenticationMethod {
                                method: AuthenticationMethod::NoAcceptable,
                            }),
                        }
                    }
                    Err(e) if needs_more_data(&e) => Action::WaitForMoreData,
                    Err(e) => Action::Failed(e),
                }
            }
            ServerState::PendingAuthentication { selected } => {
                if *selected == AuthenticationMethod::None {
                    self.transition(ServerState::WaitForClientRequest);
                    self.step()
                } else {
                    self.transition(ServerState::Authenticating);
                    Action::WaitForMoreData
                }
            }
            ServerState::Authenticating => match self.auth.handle_incoming(&mut self.recv_buf) {
                AuthResult::NeedsMoreData => Action::WaitForMoreData,
                AuthResult::Complete => {
                    self.transition(ServerState::WaitForClientRequest);
                    self.step()
                }
                AuthResult::Respond(bytes) => Action::Respond(bytes),
                AuthResult::Failed => Action::Failed(Error::NoValidAuthenticationMethod),
            },
            ServerState::WaitForClientRequest => {
                let mut cursor: &[u8] = &self.recv_buf[..];
                match SocksRequest::read(&mut cursor) {
                    Ok(request) => {
                        let consumed = self.recv_buf.len() - cursor.len();
                        self.recv_buf.advance(consumed);
                        let (reply, bound_address) = self.backend.connect(&request);
                        let response = SocksResponse { reply, bound_address };
                        if response.reply.is_success() {
                            self.transition(ServerState::Active);
                            Action::SendResponseAndEstablish(response)
                        } else {
                            Action::SendResponseAndClose(response)
                        }
                    }
                    Err(e) if needs_more_data(&e) => Action::WaitForMoreData,
                    Err(e) => Action::Failed(e),
                }
            }
            ServerState::Active => Action::WaitForMoreData,
        }
    }

    /// Repeatedly applies [`Self::step`], performing the I/O each
    /// `Action` implies, until the state machine needs more bytes or
    /// the channel closes.
    fn drive(&mut self, ctx: &mut Context<Bytes>) {
        loop {
            match self.step() {
                Action::WaitForMoreData => return,
                Action::SendSelectedMethod(selected) => {
                    let mut out = BytesMut::new();
                    selected.write(&mut out);
                    let _ = ctx.write(out.freeze());
                }
                Action::RejectAndClose(selected) => {
                    let mut out = BytesMut::new();
                    selected.write(&mut out);
                    let _ = ctx.write(out.freeze());
                    ctx.close();
                    return;
                }
                Action::Respond(bytes) => {
                    let _ = ctx.write(bytes);
                }
                Action::SendResponseAndEstablish(response) => {
                    let mut out = BytesMut::new();
                    response.write(&mut out);
                    let _ = ctx.write(out.freeze());
                    let trailing = self.recv_buf.split().freeze();
                    ctx.fire_user_event(Box::new(ProxyEstablished { trailing_bytes: trailing }));
                }
                Action::SendResponseAndClose(response) => {
                    let mut out = BytesMut::new();
                    response.write(&mut out);
                    let _ = ctx.write(out.freeze());
                    ctx.close();
                    return;
                }
                Action::Failed(_) => {
                    ctx.close();
                    return;
                }
            }
        }
    }
}

impl Handler for SocksServerHandler {
    type In = Bytes;
    type Out = Bytes;

    fn on_channel_active(&mut self, ctx: &mut Context<Bytes>) {
        self.drive(ctx);
    }

    fn on_read(&mut self, ctx: &mut Context<Bytes>, msg: Bytes) {
        if matches!(self.state, ServerState::Active) {
            ctx.fire_user_event(Box::new(ProxyEstablished { trailing_bytes: msg }));
            return;
        }
        self.recv_buf.extend_from_slice(&msg);
        self.drive(ctx);
    }

    /// An [`crate::socks::ApplicationWrite`] submitted before the
    /// handshake reaches `Active` is out of order for a server (spec
    /// §4.I): unlike the client side, there's no pending application
    /// data to queue before a proxy has even been asked for, so the
    /// promise fails instead of buffering.
    fn on_user_event(&mut self, ctx: &mut Context<Bytes>, event: Box<dyn Any + Send>) {
        let Ok(write) = event.downcast::<crate::socks::ApplicationWrite>() else { return };
        if matches!(self.state, ServerState::Active) {
            let _ = ctx.write(write.data);
            write.completer.keep(());
        } else {
            write.completer.fail(Error::InvalidServerState);
        }
    }

    fn on_error(&mut self, ctx: &mut Context<Bytes>, _err: Error) {
        ctx.close();
    }
}

/// Assembles a [`PassthroughCodec`] and a [`SocksServerHandler`] onto a
/// fresh channel over `transport` (spec §6.5).
pub fn install_socks_server<T>(
    transport: T,
    auth: impl AuthenticationDelegate,
    backend: impl ConnectionBackend,
) -> JoinHandle<()>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pipeline::channel::spawn(transport, PassthroughCodec, SocksServerHandler::new(auth, backend))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socks::SocksCommand;
    use bytes::BufMut;

    #[test]
    fn none_delegate_selects_none_when_offered() {
        let mut delegate = NoAuthenticationDelegate;
        assert_eq!(delegate.select_method(&[AuthenticationMethod::None]), Some(AuthenticationMethod::None));
    }

    #[test]
    fn none_delegate_refuses_when_none_not_offered() {
        let mut delegate = NoAuthenticationDelegate;
        assert_eq!(delegate.select_method(&[AuthenticationMethod::Gssapi]), None);
    }

    #[test]
    fn accept_all_backend_reports_success_with_zero_address() {
        let mut backend = AcceptAllBackend;
        let request = SocksRequest { command: SocksCommand::Connect, address: SocksAddress::V4 { addr: [1, 2, 3, 4], port: 9000 } };
        let (reply, bound) = backend.connect(&request);
        assert!(reply.is_success());
        assert_eq!(bound, SocksAddress::V4 { addr: [0, 0, 0, 0], port: 0 });
    }

    /// Spec §8 scenario 4: a GSSAPI-only greeting (`05 01 01`) is not
    /// satisfiable by [`NoAuthenticationDelegate`], so the server must
    /// reply `05 ff`.
    #[test]
    fn gssapi_only_greeting_is_rejected_by_none_delegate() {
        let mut out = BytesMut::new();
        out.put_u8(0x05);
        out.put_u8(0x01);
        out.put_u8(0x01);
        let mut cursor = &out[..];
        let greeting = ClientGreeting::read(&mut cursor).unwrap();
        assert_eq!(greeting.methods, vec![AuthenticationMethod::Gssapi]);

        let mut delegate = NoAuthenticationDelegate;
        assert_eq!(delegate.select_method(&greeting.methods), None);

        let rejection = SelectedAuthenticationMethod { method: AuthenticationMethod::NoAcceptable };
        let mut reply = BytesMut::new();
        rejection.write(&mut reply);
        assert_eq!(&reply[..], &[0x05, 0xff]);
    }

    #[test]
    fn greeting_decode_waits_for_more_data_on_truncated_method_list() {
        let mut out = BytesMut::new();
        out.put_u8(0x05);
        out.put_u8(0x02); // claims 2 methods, supplies none
        let mut cursor = &out[..];
        let err = ClientGreeting::read(&mut cursor).unwrap_err();
        assert!(needs_more_data(&err));
    }
}
