// Outbound side of the relay: a writer task rendering messages as IRC lines.

use crate::core::tracking::OutboundMessage;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Cheap, cloneable handle for queueing outbound messages.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl Outbox {
    /// Writer task on stdout.
    pub fn spawn_stdout() -> (Self, JoinHandle<tokio::io::Stdout>) {
        Self::spawn_with_writer(tokio::io::stdout())
    }

    /// Writer task on any async writer. The task ends, handing the writer
    /// back, once every `Outbox` clone is dropped.
    pub fn spawn_with_writer<W>(mut writer: W) -> (Self, JoinHandle<W>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<OutboundMessage>();

        let handle = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let line = format!("{}\n", msg);
                if let Err(e) = writer.write_all(line.as_bytes()).await {
                    tracing::error!("Failed to write outbound message: {}", e);
                    continue;
                }
                if let Err(e) = writer.flush().await {
                    tracing::error!("Failed to flush outbound messages: {}", e);
                }
            }
            writer
        });

        (Self { tx }, handle)
    }

    pub fn send(&self, messages: impl IntoIterator<Item = OutboundMessage>) {
        for msg in messages {
            if self.tx.send(msg).is_err() {
                tracing::error!("Outbound writer is gone, dropping message");
                return;
            }
        }
    }
}
