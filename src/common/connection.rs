//! # TCP Connection Abstraction
//!
//! Wraps TCP streams with envelope framing for the orchestration protocol.
//!
//! ## Wire Protocol
//!
//! Envelopes are sent with a 4-byte length prefix (big-endian) followed by
//! JSON data:
//! ```text
//! [4 bytes: envelope length] [N bytes: JSON envelope data]
//! ```
//!
//! The length-prefixed protocol gives reliable message boundaries over TCP
//! and protects against incomplete reads. The reader and writer halves can
//! be split so that one task reads from a peer while another owns writes.

use anyhow::Result;
use log::error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use super::messages::Envelope;

/// Maximum allowed envelope size (16MB) to prevent memory exhaustion.
const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Read half of a framed connection.
pub struct FramedReader<R> {
    reader: R,
}

impl<R: AsyncRead + Unpin> FramedReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Read one envelope from the connection.
    ///
    /// Returns `Ok(None)` when the peer closed the connection cleanly or the
    /// frame could not be decoded; `Err` on an I/O error mid-frame.
    pub async fn read_envelope(&mut self) -> Result<Option<Envelope>> {
        let mut length_buf = [0u8; 4];
        if self.reader.read_exact(&mut length_buf).await.is_err() {
            // Peer closed the connection.
            return Ok(None);
        }

        let length = u32::from_be_bytes(length_buf) as usize;
        if length > MAX_FRAME_SIZE {
            error!(
                "frame too large: {} bytes (max: {} bytes)",
                length, MAX_FRAME_SIZE
            );
            return Ok(None);
        }

        let mut data = vec![0u8; length];
        self.reader.read_exact(&mut data).await?;

        match Envelope::from_bytes(&data) {
            Ok(envelope) => Ok(Some(envelope)),
            Err(e) => {
                error!("failed to deserialize envelope: {}", e);
                Ok(None)
            }
        }
    }
}

/// Write half of a framed connection.
pub struct FramedWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FramedWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write one envelope to the connection and flush it.
    pub async fn write_envelope(&mut self, envelope: &Envelope) -> Result<()> {
        let data = envelope.to_bytes()?;
        let length = data.len() as u32;

        // Send: [4 bytes length][envelope data]
        self.writer.write_all(&length.to_be_bytes()).await?;
        self.writer.write_all(&data).await?;
        self.writer.flush().await?;

        Ok(())
    }
}

/// A full-duplex framed TCP connection.
pub struct Connection {
    reader: FramedReader<OwnedReadHalf>,
    writer: FramedWriter<OwnedWriteHalf>,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: FramedReader::new(read_half),
            writer: FramedWriter::new(write_half),
        }
    }

    pub async fn read_envelope(&mut self) -> Result<Option<Envelope>> {
        self.reader.read_envelope().await
    }

    pub async fn write_envelope(&mut self, envelope: &Envelope) -> Result<()> {
        self.writer.write_envelope(envelope).await
    }

    /// Split into independently owned read and write halves, so a writer
    /// task can own outbound traffic while the session loop keeps reading.
    pub fn into_split(
        self,
    ) -> (
        FramedReader<OwnedReadHalf>,
        FramedWriter<OwnedWriteHalf>,
    ) {
        (self.reader, self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::messages::Payload;
    use crate::common::task::Task;

    #[tokio::test]
    async fn envelopes_survive_framing() {
        let (client_end, server_end) = tokio::io::duplex(64 * 1024);
        let mut writer = FramedWriter::new(client_end);
        let mut reader = FramedReader::new(server_end);

        let envelope = Envelope::new(Payload::SubmitTask(Task::new(
            "task-abc", "cliente1", "render frame",
        )))
        .with_lamport(3);
        writer.write_envelope(&envelope).await.unwrap();

        let received = reader.read_envelope().await.unwrap().unwrap();
        assert_eq!(received.lamport, 3);
        assert_eq!(received.payload.kind(), "SUBMIT_TASK");
    }

    #[tokio::test]
    async fn back_to_back_frames_keep_boundaries() {
        let (client_end, server_end) = tokio::io::duplex(64 * 1024);
        let mut writer = FramedWriter::new(client_end);
        let mut reader = FramedReader::new(server_end);

        for i in 0..3u64 {
            let envelope = Envelope::new(Payload::Heartbeat {
                worker_id: format!("worker-{}", i),
            });
            writer.write_envelope(&envelope).await.unwrap();
        }

        for i in 0..3u64 {
            let received = reader.read_envelope().await.unwrap().unwrap();
            match received.payload {
                Payload::Heartbeat { worker_id } => {
                    assert_eq!(worker_id, format!("worker-{}", i))
                }
                other => panic!("wrong payload kind: {}", other.kind()),
            }
        }
    }

    #[tokio::test]
    async fn closed_connection_reads_as_none() {
        let (client_end, server_end) = tokio::io::duplex(1024);
        drop(client_end);

        let mut reader = FramedReader::new(server_end);
        assert!(reader.read_envelope().await.unwrap().is_none());
    }
}
