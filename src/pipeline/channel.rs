//! A channel: one transport, one codec, one [`Handler`], driven by
//! exactly one task for the channel's lifetime (spec §4.A, §5).

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, Encoder, Framed};
use tracing::{debug, info};

use crate::pipeline::context::Context;
use crate::pipeline::handler::Handler;
use crate::pipeline::PipelineError;

/// Spawns the task that owns `transport` for its lifetime: decodes
/// inbound frames via `codec` and feeds them to `handler.on_read`,
/// and serializes/writes whatever `handler` queues via [`Context::write`].
///
/// This is the "one event-loop thread per channel" of spec §5: there is
/// no shared mutable state between this task and any other channel's.
pub fn spawn<T, C, H>(transport: T, codec: C, mut handler: H) -> JoinHandle<()>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    C: Decoder<Item = H::In> + Encoder<H::Out> + Send + 'static,
    <C as Decoder>::Error: Into<PipelineError> + Send,
    <C as Encoder<H::Out>>::Error: Into<PipelineError> + Send,
    H: Handler,
{
    tokio::spawn(async move {
        let mut framed = Framed::new(transport, codec);
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        let (physical_tx, mut physical_rx) = mpsc::unbounded_channel();
        let (flush_tx, mut flush_rx) = mpsc::unbounded_channel();
        let (user_event_tx, mut user_event_rx) = mpsc::unbounded_channel();
        let (close_tx, mut close_rx) = mpsc::unbounded_channel();
        let mut ctx = Context { outbound_tx, physical_tx, flush_tx, user_event_tx, close_tx };

        info!("channel accepted");
        handler.on_channel_active(&mut ctx);

        loop {
            tokio::select! {
                biased;

                _ = close_rx.recv() => {
                    break;
                }

                frame = framed.next() => {
                    match frame {
                        Some(Ok(msg)) => handler.on_read(&mut ctx, msg),
                        Some(Err(e)) => {
                            let err = e.into();
                            debug!(error = %err, "channel decode error");
                            handler.on_error(&mut ctx, err);
                        }
                        None => break,
                    }
                }

                event = user_event_rx.recv() => {
                    match event {
                        Some(ev) => handler.on_user_event(&mut ctx, ev),
                        None => break,
                    }
                }

                ev = flush_rx.recv() => {
                    match ev {
                        Some(()) => handler.on_flush(&mut ctx),
                        None => break,
                    }
                }

                // Logical writes go through the handler first (spec
                // §4.A) — it may buffer or reorder before calling
                // `Context::emit` to actually put bytes on the wire.
                item = outbound_rx.recv() => {
                    match item {
                        Some(item) => handler.on_write(&mut ctx, item.msg, item.completer),
                        None => break,
                    }
                }

                item = physical_rx.recv() => {
                    match item {
                        Some(item) => match framed.send(item.msg).await {
                            Ok(()) => item.completer.keep(()),
                            Err(e) => item.completer.fail(e.into()),
                        },
                        None => break,
                    }
                }
            }
        }

        info!("channel closed");

        // Fail every pending write so no promise is silently dropped
        // (spec §5 cancellation, §7 propagation policy).
        outbound_rx.close();
        while let Ok(item) = outbound_rx.try_recv() {
            item.completer.fail(PipelineError::ChannelClosed);
        }
        physical_rx.close();
        while let Ok(item) = physical_rx.try_recv() {
            item.completer.fail(PipelineError::ChannelClosed);
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use bytes::{Buf, BufMut, BytesMut};
    use tokio::io::DuplexStream;
    use tokio_util::codec::{Decoder, Encoder};

    use super::*;
    use crate::pipeline::context::Context;
    use crate::pipeline::handler::Handler;

    struct LineCodec;

    impl Decoder for LineCodec {
        type Item = String;
        type Error = std::io::Error;

        fn decode(&mut self, src: &mut BytesMut) -> std::io::Result<Option<String>> {
            if let Some(pos) = src.iter().position(|b| *b == b'\n') {
                let line = src.split_to(pos);
                src.advance(1);
                Ok(Some(String::from_utf8_lossy(&line).into_owned()))
            } else {
                Ok(None)
            }
        }
    }

    impl Encoder<String> for LineCodec {
        type Error = std::io::Error;

        fn encode(&mut self, item: String, dst: &mut BytesMut) -> std::io::Result<()> {
            dst.put_slice(item.as_bytes());
            dst.put_u8(b'\n');
            Ok(())
        }
    }

    struct EchoHandler {
        count: Arc<AtomicUsize>,
    }

    impl Handler for EchoHandler {
        type In = String;
        type Out = String;

        fn on_read(&mut self, ctx: &mut Context<String>, msg: String) {
            self.count.fetch_add(1, Ordering::SeqCst);
            ctx.write(format!("echo:{msg}"));
        }
    }

    #[tokio::test]
    async fn echoes_decoded_lines_back_out() {
        let (client, server) = tokio::io::duplex(4096);
        let count = Arc::new(AtomicUsize::new(0));
        let _handle = spawn(server, LineCodec, EchoHandler { count: count.clone() });

        let mut client: DuplexStream = client;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        client.write_all(b"hello\n").await.unwrap();

        let mut buf = [0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"echo:hello\n");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
