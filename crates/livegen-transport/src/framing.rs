//! Newline-delimited JSON framing

use crate::error::TransportError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::trace;

/// Reads one JSON frame per line, bounded by `max_frame_bytes`
pub(crate) struct FrameReader<R> {
    reader: BufReader<R>,
    max_frame_bytes: usize,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub(crate) fn new(inner: R, max_frame_bytes: usize) -> Self {
        Self {
            reader: BufReader::new(inner),
            max_frame_bytes,
            buf: Vec::new(),
        }
    }

    /// Next frame, or `None` at end of stream. Blank lines are skipped.
    pub(crate) async fn next<T: DeserializeOwned>(&mut self) -> Result<Option<T>, TransportError> {
        loop {
            self.buf.clear();
            let limit = self.max_frame_bytes as u64 + 1;
            let read = (&mut self.reader)
                .take(limit)
                .read_until(b'\n', &mut self.buf)
                .await?;
            if read == 0 {
                return Ok(None);
            }
            let complete = self.buf.last() == Some(&b'\n');
            let line = strip_newline(&self.buf);
            if line.len() > self.max_frame_bytes {
                return Err(TransportError::FrameTooLarge {
                    len: line.len(),
                    limit: self.max_frame_bytes,
                });
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                if complete {
                    continue;
                }
                return Ok(None);
            }
            trace!(bytes = line.len(), "frame in");
            return Ok(Some(serde_json::from_slice(line)?));
        }
    }
}

fn strip_newline(buf: &[u8]) -> &[u8] {
    let buf = buf.strip_suffix(b"\n").unwrap_or(buf);
    buf.strip_suffix(b"\r").unwrap_or(buf)
}

/// Writes one JSON frame per line
pub(crate) struct FrameWriter<W> {
    writer: W,
    max_frame_bytes: usize,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub(crate) fn new(writer: W, max_frame_bytes: usize) -> Self {
        Self {
            writer,
            max_frame_bytes,
        }
    }

    pub(crate) async fn send<T: Serialize>(&mut self, frame: &T) -> Result<(), TransportError> {
        let mut line = serde_json::to_vec(frame)?;
        if line.len() > self.max_frame_bytes {
            return Err(TransportError::FrameTooLarge {
                len: line.len(),
                limit: self.max_frame_bytes,
            });
        }
        trace!(bytes = line.len(), "frame out");
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub(crate) async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Handshake;

    #[tokio::test]
    async fn reads_frames_and_skips_blank_lines() {
        let input: &[u8] = b"{\"type\":\"ready\"}\n\n\r\n{\"type\":\"rejected\",\"reason\":\"no\"}";
        let mut reader = FrameReader::new(input, 1024);
        assert_eq!(reader.next::<Handshake>().await.unwrap(), Some(Handshake::Ready));
        assert_eq!(
            reader.next::<Handshake>().await.unwrap(),
            Some(Handshake::Rejected { reason: "no".into() })
        );
        assert_eq!(reader.next::<Handshake>().await.unwrap(), None);
    }

    #[tokio::test]
    async fn oversized_frame_is_refused() {
        let input = format!("{{\"type\":\"hello\",\"token\":\"{}\"}}\n", "x".repeat(64));
        let mut reader = FrameReader::new(input.as_bytes(), 32);
        let err = reader.next::<Handshake>().await.unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge { limit: 32, .. }), "{err:?}");
    }

    #[tokio::test]
    async fn malformed_frame_is_a_protocol_error() {
        let mut reader = FrameReader::new(&b"{not json}\n"[..], 1024);
        let err = reader.next::<Handshake>().await.unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
    }

    #[tokio::test]
    async fn writer_appends_newline() {
        let mut out = Vec::new();
        FrameWriter::new(&mut out, 1024)
            .send(&Handshake::Ready)
            .await
            .unwrap();
        assert_eq!(out, b"{\"type\":\"ready\"}\n");
    }
}
