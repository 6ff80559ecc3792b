//! The single handler trait all protocol logic in this crate implements
//! (spec §4.A, §9: "a single handler trait with default no-op methods").
//!
//! Netty/SwiftNIO-style pipelines chain many narrow handlers together;
//! every chain that actually occurs in this crate is exactly
//! "byte-to-message codec, then one protocol handler", so [`Channel`]
//! hard-wires that codec stage instead of threading a dynamic handler
//! list. The protocol handler still sees the same lifecycle hooks
//! (`on_channel_active`, `on_read`, `on_user_event`, `on_error`) a
//! deeper chain would give it.
//!
//! [`Channel`]: crate::pipeline::channel::Channel

use std::any::Any;

use crate::pipeline::context::Context;
use crate::pipeline::promise::Completer;
use crate::pipeline::PipelineError;

/// A user-defined, in-band signal delivered via [`Handler::on_user_event`]
/// (spec §4.A "in-band signals (e.g. proxy established)").
pub type UserEvent = Box<dyn Any + Send>;

/// Protocol logic installed onto a [`Channel`](crate::pipeline::channel::Channel).
///
/// All methods have no-op defaults except [`on_read`](Handler::on_read);
/// implementors override only the hooks they need.
pub trait Handler: Send + 'static {
    /// Inbound message type produced by the channel's codec.
    type In: Send + 'static;
    /// Outbound message type accepted by the channel's codec.
    type Out: Send + 'static;

    /// Fired once when the transport becomes ready.
    fn on_channel_active(&mut self, _ctx: &mut Context<Self::Out>) {}

    /// Inbound message delivery.
    fn on_read(&mut self, ctx: &mut Context<Self::Out>, msg: Self::In);

    /// In-band signal delivery (spec §4.A `on_user_event`).
    fn on_user_event(&mut self, _ctx: &mut Context<Self::Out>, _event: UserEvent) {}

    /// Outbound message queued via [`Context::write`](crate::pipeline::context::Context::write);
    /// may be reordered or buffered before it reaches the transport
    /// (spec §4.A). The default forwards it straight to the transport.
    fn on_write(&mut self, ctx: &mut Context<Self::Out>, msg: Self::Out, completer: Completer<()>) {
        ctx.emit(msg, completer);
    }

    /// Requests that any writes the handler has buffered be emitted now
    /// (spec §4.A). The default is a no-op: the default `on_write` never
    /// buffers, so there is nothing to flush.
    fn on_flush(&mut self, _ctx: &mut Context<Self::Out>) {}

    /// An error caught from the codec or the channel's I/O. The default
    /// closes the channel, matching spec §7: decode/framing errors are
    /// fatal to the channel.
    fn on_error(&mut self, ctx: &mut Context<Self::Out>, _err: PipelineError) {
        ctx.close();
    }
}
