//! Per-channel handle handlers use to write, flush, signal, or close.

use tokio::sync::mpsc;

use crate::pipeline::handler::UserEvent;
use crate::pipeline::promise::{self, Promise};

pub(crate) struct OutboundItem<Out> {
    pub(crate) msg: Out,
    pub(crate) completer: promise::Completer<()>,
}

/// Handle passed to [`Handler`](crate::pipeline::handler::Handler) callbacks.
///
/// Writes enqueue onto an internal channel drained by the owning
/// [`Channel`](crate::pipeline::channel::Channel) task — handler
/// callbacks are synchronous, so outbound I/O always happens on the
/// channel's own task, preserving the "one event loop per channel, no
/// preemption" model of spec §5.
///
/// `write` doesn't reach the transport directly: the channel task hands
/// every queued message to [`Handler::on_write`](crate::pipeline::handler::Handler::on_write)
/// first (spec §4.A), which may reorder or buffer it. [`Context::emit`]
/// is the handler's way back onto the wire — the default `on_write`
/// calls it immediately, and a buffering handler calls it later, from
/// [`Handler::on_flush`](crate::pipeline::handler::Handler::on_flush).
pub struct Context<Out> {
    pub(crate) outbound_tx: mpsc::UnboundedSender<OutboundItem<Out>>,
    pub(crate) physical_tx: mpsc::UnboundedSender<OutboundItem<Out>>,
    pub(crate) flush_tx: mpsc::UnboundedSender<()>,
    pub(crate) user_event_tx: mpsc::UnboundedSender<UserEvent>,
    pub(crate) close_tx: mpsc::UnboundedSender<()>,
}

impl<Out> Clone for Context<Out> {
    fn clone(&self) -> Self {
        Self {
            outbound_tx: self.outbound_tx.clone(),
            physical_tx: self.physical_tx.clone(),
            flush_tx: self.flush_tx.clone(),
            user_event_tx: self.user_event_tx.clone(),
            close_tx: self.close_tx.clone(),
        }
    }
}

impl<Out: Send + 'static> Context<Out> {
    /// Queues `msg` for the handler's `on_write` to see, returning a
    /// promise that completes once the bytes have been handed to the
    /// transport (or fails with [`PipelineError::ChannelClosed`](crate::pipeline::PipelineError::ChannelClosed)
    /// if the channel closes first).
    pub fn write(&self, msg: Out) -> Promise<()> {
        let (completer, promise) = promise::pair();
        // An unbounded send only fails if the channel task has already
        // exited; the promise is then immediately dropped, which
        // resolves the returned `Promise` as `ChannelClosed`.
        let _ = self.outbound_tx.send(OutboundItem { msg, completer });
        promise
    }

    /// Hands `msg` straight to the transport, bypassing `on_write`
    /// entirely (spec §4.A). Called by the default `on_write`
    /// implementation for handlers that don't buffer, and by buffering
    /// handlers once `on_flush` decides a message is ready to go out.
    pub fn emit(&self, msg: Out, completer: promise::Completer<()>) {
        let _ = self.physical_tx.send(OutboundItem { msg, completer });
    }

    /// Requests that the channel invoke the handler's `on_flush` on its
    /// next turn through the event loop (spec §4.A `on_flush`: "request
    /// that buffered writes be emitted").
    pub fn request_flush(&self) {
        let _ = self.flush_tx.send(());
    }

    /// Fires an in-band user event for the handler to observe on its
    /// next poll (spec §4.A `on_user_event`).
    pub fn fire_user_event(&self, event: UserEvent) {
        let _ = self.user_event_tx.send(event);
    }

    /// Requests the channel close. Any outstanding write promises are
    /// failed with `ChannelClosed` (spec §5 cancellation).
    pub fn close(&self) {
        let _ = self.close_tx.send(());
    }
}
