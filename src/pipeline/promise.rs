//! Write-once, single-consumer completion handles for outbound operations.
//!
//! A [`Promise`] is resolved by a [`Completer`] from the same task that
//! owns the channel (spec §4.A/§5: "Completion MUST happen on the owning
//! event loop"). `Completer::keep` consumes `self`, so "at most once
//! completion" (spec §8 property 8) holds at the type level rather than
//! by convention.

use tokio::sync::oneshot;

use crate::pipeline::PipelineError;

/// The producing half of a promise, handed to whoever performs the
/// asynchronous work (a [`crate::nfs3::dispatch::Filesystem`] method, an
/// outbound write). Consumed by [`Completer::keep`] or
/// [`Completer::fail`] — exactly one of the two may be called.
pub struct Completer<T> {
    tx: oneshot::Sender<Result<T, PipelineError>>,
}

/// The consuming half; awaiting it yields the result once the matching
/// [`Completer`] resolves, or [`PipelineError::ChannelClosed`] if the
/// completer was dropped without resolving (e.g. the channel closed
/// while the operation was in flight).
pub struct Promise<T> {
    rx: oneshot::Receiver<Result<T, PipelineError>>,
}

/// Creates a linked completer/promise pair.
pub fn pair<T>() -> (Completer<T>, Promise<T>) {
    let (tx, rx) = oneshot::channel();
    (Completer { tx }, Promise { rx })
}

impl<T> Completer<T> {
    /// Resolves the promise successfully. Consumes `self`.
    pub fn keep(self, value: T) {
        let _ = self.tx.send(Ok(value));
    }

    /// Resolves the promise with an error. Consumes `self`.
    pub fn fail(self, err: PipelineError) {
        let _ = self.tx.send(Err(err));
    }
}

impl<T> Promise<T> {
    /// Awaits resolution. A dropped [`Completer`] (channel closed before
    /// completion) surfaces as [`PipelineError::ChannelClosed`].
    pub async fn wait(self) -> Result<T, PipelineError> {
        match self.rx.await {
            Ok(inner) => inner,
            Err(_) => Err(PipelineError::ChannelClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keep_resolves_promise() {
        let (completer, promise) = pair::<u32>();
        completer.keep(42);
        assert_eq!(promise.wait().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn dropped_completer_fails_promise() {
        let (completer, promise) = pair::<u32>();
        drop(completer);
        assert_eq!(promise.wait().await, Err(PipelineError::ChannelClosed));
    }

    #[tokio::test]
    async fn fail_resolves_with_given_error() {
        let (completer, promise) = pair::<u32>();
        completer.fail(PipelineError::ChannelClosed);
        assert_eq!(promise.wait().await, Err(PipelineError::ChannelClosed));
    }
}
