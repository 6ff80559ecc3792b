//! SOCKSv5 client handshake state machine (spec §4.H): sends the
//! greeting, negotiates an authentication method, issues the CONNECT/
//! BIND/UDP_ASSOCIATE request, and once the server replies success,
//! becomes a transparent byte pipe.
//!
//! Grounded on the pack's from-scratch SOCKS5 clients for wire texture
//! (`other_examples/feb165d3_..._socks5.rs`, `other_examples/37368951_
//! ..._no_auth.rs`), restructured into an explicit state type driven by
//! a returned `Action` rather than those examples' inline read loops, to
//! match this crate's side-effect-light handler idiom.

use std::any::Any;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tracing::trace;

use crate::pipeline::buffer::MarkedBuffer;
use crate::pipeline::context::Context;
use crate::pipeline::handler::Handler;
use crate::pipeline::promise::Completer;
use crate::pipeline::{self, PipelineError as Error};
use crate::socks::{
    AuthenticationMethod, ClientGreeting, PassthroughCodec, ProxyEstablished, SelectedAuthenticationMethod,
    SocksAddress, SocksCommand, SocksRequest, SocksResponse,
};

/// Result of feeding bytes to an authentication sub-protocol (spec
/// §4.H). `Respond` carries bytes the handler must write to the server
/// on the delegate's behalf.
#[derive(Debug)]
pub enum AuthResult {
    NeedsMoreData,
    Respond(Bytes),
    Failed,
    Complete,
}

/// The SOCKS client's pluggable authentication backend (spec §4.H,
/// §6.5). `USER_PASS`/`GSSAPI` sub-protocols plug in here; this crate
/// ships only [`NoAuthenticationDelegate`].
pub trait AuthenticationDelegate: Send + 'static {
    fn supported_methods(&self) -> Vec<AuthenticationMethod>;
    fn server_selected_method(&mut self, method: AuthenticationMethod) -> AuthResult;
    fn handle_incoming(&mut self, buf: &mut BytesMut) -> AuthResult;
}

/// Offers only `NONE` and completes authentication immediately —
/// correct whenever the server is known to require no authentication
/// (spec §8 scenario 3).
#[derive(Debug, Default)]
pub struct NoAuthenticationDelegate;

impl AuthenticationDelegate for NoAuthenticationDelegate {
    fn supported_methods(&self) -> Vec<AuthenticationMethod> {
        vec![AuthenticationMethod::None]
    }

    fn server_selected_method(&mut self, _method: AuthenticationMethod) -> AuthResult {
        AuthResult::Complete
    }

    fn handle_incoming(&mut self, _buf: &mut BytesMut) -> AuthResult {
        AuthResult::Complete
    }
}

/// Actions the state machine returns to [`SocksClientHandler::drive`]
/// (spec §4.H). `Respond` and `Failed` extend the four the spec names
/// plus `AuthenticateIfNeeded` — they carry an authentication
/// sub-protocol's reply bytes and a terminal error out of [`Self::step`]
/// without `step` touching the [`Context`] itself, keeping transition
/// logic and I/O separate.
#[derive(Debug)]
pub enum Action {
    WaitForMoreData,
    SendGreeting(ClientGreeting),
    SendRequest(SocksRequest),
    ProxyEstablished,
    AuthenticateIfNeeded(AuthenticationMethod),
    Respond(Bytes),
    Failed(Error),
}

#[derive(Debug)]
enum ClientState {
    Inactive,
    AwaitingSelectedMethod { offered: Vec<AuthenticationMethod> },
    PendingAuthentication,
    Authenticating,
    WaitForClientRequest,
    AwaitingResponse,
    Active,
}

#[cfg(test)]
impl ClientState {
    /// Position in the state diagram of spec §4.H, used only to assert
    /// property 7 ("state monotonicity") in tests — never compared in
    /// non-test code.
    fn ordinal(&self) -> u8 {
        match self {
            ClientState::Inactive => 0,
            ClientState::AwaitingSelectedMethod { .. } => 1,
            ClientState::PendingAuthentication => 2,
            ClientState::Authenticating => 3,
            ClientState::WaitForClientRequest => 4,
            ClientState::AwaitingResponse => 5,
            ClientState::Active => 6,
        }
    }
}

fn needs_more_data(err: &Error) -> bool {
    matches!(err, Error::Xdr(crate::xdr::Error::TooShort))
}

/// Drives the client-side handshake of spec §4.H over a [`Context`].
pub struct SocksClientHandler {
    state: ClientState,
    command: SocksCommand,
    target: SocksAddress,
    delegate: Box<dyn AuthenticationDelegate>,
    recv_buf: BytesMut,
    pending_writes: MarkedBuffer<Bytes>,
    last_selected: AuthenticationMethod,
}

impl SocksClientHandler {
    /// `target` cannot be a UNIX domain socket path (spec §4.H); this is
    /// enforced by [`SocksAddress::domain`] at construction, not here —
    /// `target` is already a validated [`SocksAddress`] by the time it
    /// reaches this constructor.
    pub fn new(command: SocksCommand, target: SocksAddress, delegate: impl AuthenticationDelegate) -> Self {
        Self {
            state: ClientState::Inactive,
            command,
            target,
            delegate: Box::new(delegate),
            recv_buf: BytesMut::new(),
            pending_writes: MarkedBuffer::new(),
            last_selected: AuthenticationMethod::None,
        }
    }

    /// Logs and applies a state transition (spec §12: SOCKS state
    /// transitions log at `trace`).
    fn transition(&mut self, to: ClientState) {
        trace!(from = ?self.state, to = ?to, "socks client state transition");
        self.state = to;
    }

    fn enter_active(&mut self) -> Action {
        self.transition(ClientState::Active);
        Action::ProxyEstablished
    }

    /// Computes the next [`Action`] from the current state and whatever
    /// bytes are buffered, without performing any I/O itself — the
    /// caller ([`Self::drive`]) is responsible for acting on it. Mirrors
    /// the state diagram of spec §4.H one transition at a time.
    fn step(&mut self) -> Action {
        match &self.state {
            ClientState::AwaitingSelectedMethod { offered } => {
                let offered = offered.clone();
                let mut cursor: &[u8] = &self.recv_buf[..];
                match SelectedAuthenticationMethod::read(&mut cursor) {
                    Ok(selected) => {
                        let consumed = self.recv_buf.len() - cursor.len();
                        self.recv_buf.advance(consumed);
                        if !offered.contains(&selected.method) {
                            return Action::Failed(Error::InvalidAuthenticationSelection(selected.method.to_u8()));
                        }
                        self.transition(ClientState::PendingAuthentication);
                        Action::AuthenticateIfNeeded(selected.method)
                    }
                    Err(e) if needs_more_data(&e) => Action::WaitForMoreData,
                    Err(e) => Action::Failed(e),
                }
            }
            ClientState::PendingAuthentication => match self.delegate.server_selected_method(self.last_selected) {
                AuthResult::Complete => {
                    self.transition(ClientState::WaitForClientRequest);
                    self.step()
                }
                AuthResult::NeedsMoreData => {
                    self.transition(ClientState::Authenticating);
                    Action::WaitForMoreData
                }
                AuthResult::Respond(bytes) => {
                    self.transition(ClientState::Authenticating);
                    Action::Respond(bytes)
                }
                AuthResult::Failed => Action::Failed(Error::NoValidAuthenticationMethod),
            },
            ClientState::Authenticating => match self.delegate.handle_incoming(&mut self.recv_buf) {
                AuthResult::NeedsMoreData => Action::WaitForMoreData,
                AuthResult::Complete => {
                    self.transition(ClientState::WaitForClientRequest);
                    self.step()
                }
                AuthResult::Respond(bytes) => Action::Respond(bytes),
                AuthResult::Failed => Action::Failed(Error::NoValidAuthenticationMethod),
            },
            ClientState::WaitForClientRequest => {
                let request = SocksRequest { command: self.command, address: self.target.clone() };
                self.transition(ClientState::AwaitingResponse);
                Action::SendRequest(request)
            }
            ClientState::AwaitingResponse => {
                let mut cursor: &[u8] = &self.recv_buf[..];
                match SocksResponse::read(&mut cursor) {
                    Ok(response) => {
                        let consumed = self.recv_buf.len() - cursor.len();
                        self.recv_buf.advance(consumed);
                        if !response.reply.is_success() {
                            return Action::Failed(Error::ConnectionFailed(response.reply.to_u8()));
                        }
                        self.enter_active()
                    }
                    Err(e) if needs_more_data(&e) => Action::WaitForMoreData,
                    Err(e) => Action::Failed(e),
                }
            }
            ClientState::Inactive => {
                let offered = self.delegate.supported_methods();
                self.transition(ClientState::AwaitingSelectedMethod { offered: offered.clone() });
                Action::SendGreeting(ClientGreeting { methods: offered })
            }
            ClientState::Active => Action::WaitForMoreData,
        }
    }

    /// Repeatedly applies [`Self::step`], performing the I/O each
    /// `Action` implies, until the state machine needs more bytes or
    /// reaches `Active`.
    fn drive(&mut self, ctx: &mut Context<Bytes>) {
        loop {
            match self.step() {
                Action::WaitForMoreData => return,
                Action::SendGreeting(greeting) => {
                    let mut out = BytesMut::new();
                    greeting.write(&mut out);
                    let _ = ctx.write(out.freeze());
                }
                Action::SendRequest(request) => {
                    let mut out = BytesMut::new();
                    request.write(&mut out);
                    let _ = ctx.write(out.freeze());
                }
                Action::AuthenticateIfNeeded(method) => self.last_selected = method,
                Action::Respond(bytes) => {
                    let _ = ctx.write(bytes);
                }
                Action::ProxyEstablished => {
                    let trailing = self.recv_buf.split().freeze();
                    ctx.fire_user_event(Box::new(ProxyEstablished { trailing_bytes: trailing }));
                    for write in self.pending_writes.drain_all() {
                        let _ = ctx.write(write);
                    }
                }
                Action::Failed(_) => {
                    ctx.close();
                    return;
                }
            }
        }
    }
}

impl Handler for SocksClientHandler {
    type In = Bytes;
    type Out = Bytes;

    fn on_channel_active(&mut self, ctx: &mut Context<Bytes>) {
        self.drive(ctx);
    }

    fn on_read(&mut self, ctx: &mut Context<Bytes>, msg: Bytes) {
        if matches!(self.state, ClientState::Active) {
            ctx.fire_user_event(Box::new(ProxyEstablished { trailing_bytes: msg }));
            return;
        }
        self.recv_buf.extend_from_slice(&msg);
        self.drive(ctx);
    }

    fn on_user_event(&mut self, ctx: &mut Context<Bytes>, event: Box<dyn Any + Send>) {
        let Ok(write) = event.downcast::<crate::socks::ApplicationWrite>() else { return };
        if matches!(self.state, ClientState::Active) {
            let _ = ctx.write(write.data);
            write.completer.keep(());
        } else {
            self.pending_writes.push(write.data);
            write.completer.keep(());
        }
    }

    fn on_error(&mut self, ctx: &mut Context<Bytes>, _err: Error) {
        ctx.close();
    }
}

/// Assembles a [`PassthroughCodec`] and a [`SocksClientHandler`] onto a
/// fresh channel over `transport` (spec §6.5).
pub fn install_socks_client<T>(
    transport: T,
    command: SocksCommand,
    target: SocksAddress,
    delegate: impl AuthenticationDelegate,
) -> JoinHandle<()>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pipeline::channel::spawn(transport, PassthroughCodec, SocksClientHandler::new(command, target, delegate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socks::{SocksAddress, SocksCommand};
    use bytes::BufMut;

    #[test]
    fn none_delegate_completes_without_bytes() {
        let mut delegate = NoAuthenticationDelegate;
        assert_eq!(delegate.supported_methods(), vec![AuthenticationMethod::None]);
        assert!(matches!(delegate.server_selected_method(AuthenticationMethod::None), AuthResult::Complete));
    }

    #[test]
    fn greeting_with_none_required_matches_scenario_bytes() {
        let greeting = ClientGreeting { methods: NoAuthenticationDelegate.supported_methods() };
        let mut out = BytesMut::new();
        greeting.write(&mut out);
        assert_eq!(&out[..], &[0x05, 0x01, 0x00]);
    }

    #[test]
    fn connect_request_matches_scenario_bytes() {
        let target = SocksAddress::V4 { addr: [0x5d, 0xb8, 0xd8, 0x22], port: 80 };
        let request = SocksRequest { command: SocksCommand::Connect, address: target };
        let mut out = BytesMut::new();
        request.write(&mut out);
        assert_eq!(&out[..], &[0x05, 0x01, 0x00, 0x01, 0x5d, 0xb8, 0xd8, 0x22, 0x00, 0x50]);
    }

    #[test]
    fn selected_method_decode_waits_for_more_data() {
        let mut out = BytesMut::new();
        out.put_u8(0x05); // only the version byte has arrived so far
        let mut cursor = &out[..];
        let err = SelectedAuthenticationMethod::read(&mut cursor).unwrap_err();
        assert!(needs_more_data(&err));
    }

    fn test_context() -> (Context<Bytes>, tokio::sync::mpsc::UnboundedReceiver<crate::pipeline::context::OutboundItem<Bytes>>) {
        let (outbound_tx, outbound_rx) = tokio::sync::mpsc::unbounded_channel();
        let (user_event_tx, _user_event_rx) = tokio::sync::mpsc::unbounded_channel();
        let (close_tx, _close_rx) = tokio::sync::mpsc::unbounded_channel();
        (Context { outbound_tx, user_event_tx, close_tx }, outbound_rx)
    }

    /// Property 7 (spec §8): driving a client handler through the full
    /// scenario-3 handshake (greeting, method selection, request,
    /// success response) never revisits an earlier state.
    #[test]
    fn state_monotonicity_across_full_handshake() {
        let (mut ctx, _outbound_rx) = test_context();
        let target = SocksAddress::V4 { addr: [0x5d, 0xb8, 0xd8, 0x22], port: 80 };
        let mut handler = SocksClientHandler::new(SocksCommand::Connect, target, NoAuthenticationDelegate);

        let mut ordinals = vec![handler.state.ordinal()];
        handler.on_channel_active(&mut ctx);
        ordinals.push(handler.state.ordinal());

        let mut selection = BytesMut::new();
        SelectedAuthenticationMethod { method: AuthenticationMethod::None }.write(&mut selection);
        handler.on_read(&mut ctx, selection.freeze());
        ordinals.push(handler.state.ordinal());

        let mut response = BytesMut::new();
        SocksResponse {
            reply: crate::socks::SocksReply::Succeeded,
            bound_address: SocksAddress::V4 { addr: [0, 0, 0, 0], port: 0 },
        }
        .write(&mut response);
        handler.on_read(&mut ctx, response.freeze());
        ordinals.push(handler.state.ordinal());

        for pair in ordinals.windows(2) {
            assert!(pair[0] <= pair[1], "state went backwards: {ordinals:?}");
        }
        assert_eq!(handler.state.ordinal(), 6);
    }
}
