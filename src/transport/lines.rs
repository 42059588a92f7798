//! JSON-lines transport: each send becomes one `Delivery` line on a writer.

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use super::{Delivery, Transport};
use crate::envelope::Envelope;
use crate::types::{Error, Result};

/// Writes deliveries as newline-delimited JSON.
#[derive(Debug)]
pub struct JsonLinesTransport<W> {
    writer: Mutex<W>,
}

impl JsonLinesTransport<tokio::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W> JsonLinesTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W> Transport for JsonLinesTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&self, destination: &str, key: Option<&str>, envelope: &Envelope) -> Result<()> {
        let delivery = Delivery {
            destination: destination.to_string(),
            key: key.map(str::to_string),
            envelope: envelope.clone(),
        };
        let mut line = serde_json::to_vec(&delivery)?;
        line.push(b'\n');

        // One lock per line keeps concurrent workers from interleaving output.
        let mut writer = self.writer.lock().await;
        writer
            .write_all(&line)
            .await
            .map_err(|e| Error::transport(destination, e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| Error::transport(destination, e.to_string()))?;

        Ok(())
    }
}
