//! `Content-Length` framed transport for debug adapter messages.
//!
//! Reading is done by [`FrameReader`], a buffered decoder over any `AsyncRead`. Writing goes
//! through a single write loop task so that responses and events raised from different tasks
//! never interleave on the wire; [`FrameWriter`] handles are cheap to clone and stamp every
//! outgoing message with the next sequence number.

use condor_protocol::ProtocolMessage;
use std::io;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const MAX_BUFFER_BYTES: usize = if cfg!(test) { 4096 } else { 32 * 1024 * 1024 };
const MAX_MESSAGE_BYTES: usize = if cfg!(test) { 1024 } else { 16 * 1024 * 1024 };

const HEADER: &str = "content-length:";

fn find_double_newline(buf: &[u8]) -> Option<usize> {
    // Prefer CRLFCRLF, fall back to LFLF.
    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
        return Some(pos + 4);
    }
    buf.windows(2).position(|w| w == b"\n\n").map(|pos| pos + 2)
}

fn parse_content_length(headers: &str) -> Option<usize> {
    headers.lines().find_map(|raw_line| {
        let line = raw_line.trim_end_matches('\r').trim();
        if line.len() < HEADER.len()
            || !line.as_bytes()[..HEADER.len()].eq_ignore_ascii_case(HEADER.as_bytes())
        {
            return None;
        }
        line[HEADER.len()..].trim().parse::<usize>().ok()
    })
}

fn invalid(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

/// Frame a message body with its `Content-Length` header.
pub fn encode_frame(body: &[u8]) -> Vec<u8> {
    let mut out = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    out.extend_from_slice(body);
    out
}

pub struct FrameReader<R> {
    read: R,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(read: R) -> Self {
        Self {
            read,
            buf: Vec::new(),
        }
    }

    fn try_decode(&mut self) -> io::Result<Option<Vec<u8>>> {
        // tolerate stray blank lines between frames
        let leading = self
            .buf
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(self.buf.len());
        self.buf.drain(..leading);

        let Some(header_end) = find_double_newline(&self.buf) else {
            return Ok(None);
        };
        let headers = std::str::from_utf8(&self.buf[..header_end])
            .map_err(|e| invalid(e.to_string()))?;
        let len = parse_content_length(headers)
            .ok_or_else(|| invalid("missing Content-Length header"))?;

        if len > MAX_MESSAGE_BYTES {
            return Err(invalid(format!(
                "Content-Length {len} exceeds maximum supported message size {MAX_MESSAGE_BYTES}"
            )));
        }
        if header_end + len > MAX_BUFFER_BYTES {
            return Err(invalid(format!(
                "message size {} exceeds maximum buffer size {MAX_BUFFER_BYTES}",
                header_end + len
            )));
        }
        if self.buf.len() < header_end + len {
            return Ok(None);
        }

        let body = self.buf[header_end..header_end + len].to_vec();
        self.buf.drain(..header_end + len);
        Ok(Some(body))
    }

    /// Next frame body, `Ok(None)` at end of input. Framing errors are fatal for the stream.
    pub async fn read_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        loop {
            if let Some(body) = self.try_decode()? {
                return Ok(Some(body));
            }

            let mut tmp = [0u8; 8192];
            let n = self.read.read(&mut tmp).await?;
            if n == 0 {
                // one last attempt on whatever is buffered
                return self.try_decode();
            }
            self.buf.extend_from_slice(&tmp[..n]);
            if self.buf.len() > MAX_BUFFER_BYTES {
                return Err(invalid(format!(
                    "input buffer exceeded maximum size ({} > {MAX_BUFFER_BYTES})",
                    self.buf.len()
                )));
            }
        }
    }
}

struct WriteRequest {
    bytes: Vec<u8>,
    reply: oneshot::Sender<io::Result<()>>,
}

async fn run_write_loop<W: AsyncWrite + Unpin>(
    mut write: W,
    mut rx: mpsc::Receiver<WriteRequest>,
) {
    while let Some(req) = rx.recv().await {
        let result = async {
            write.write_all(&req.bytes).await?;
            write.flush().await?;
            Ok(())
        }
        .await;
        let should_stop = result.is_err();
        let _ = req.reply.send(result);
        if should_stop {
            break;
        }
    }
}

/// Sending half of the transport.
#[derive(Clone)]
pub struct FrameWriter {
    tx: mpsc::Sender<WriteRequest>,
    seq: Arc<AtomicI64>,
}

impl FrameWriter {
    /// Spawn the write loop over `write`. The task ends once every writer handle is dropped.
    pub fn spawn<W: AsyncWrite + Unpin + Send + 'static>(write: W) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel::<WriteRequest>(16);
        let task = tokio::spawn(run_write_loop(write, rx));
        let writer = Self {
            tx,
            seq: Arc::new(AtomicI64::new(1)),
        };
        (writer, task)
    }

    /// Stamp `message` with the next sequence number and write it.
    pub async fn send(&self, mut message: ProtocolMessage) -> io::Result<()> {
        message.set_seq(self.seq.fetch_add(1, Ordering::SeqCst));
        let json = serde_json::to_vec(&message).map_err(io::Error::other)?;

        let closed = || io::Error::new(io::ErrorKind::NotConnected, "transport closed");
        let (reply_tx, reply_rx) = oneshot::channel::<io::Result<()>>();
        self.tx
            .send(WriteRequest {
                bytes: encode_frame(&json),
                reply: reply_tx,
            })
            .await
            .map_err(|_| closed())?;
        reply_rx.await.map_err(|_| closed())?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use condor_protocol::{Event, Request};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn content_length_header_is_case_insensitive() {
        assert_eq!(parse_content_length("content-LENGTH: 42\r\n"), Some(42));
        assert_eq!(parse_content_length("X-Other: 1\r\nContent-Length:7\r\n"), Some(7));
        assert_eq!(parse_content_length("Content-Type: json\r\n"), None);
    }

    #[tokio::test]
    async fn decodes_back_to_back_frames_in_one_chunk() {
        let (mut client, server) = tokio::io::duplex(16_384);
        let mut reader = FrameReader::new(server);

        let mut bytes = encode_frame(br#"{"a":1}"#);
        bytes.extend_from_slice(b"Content-Length: 7\n\n{\"b\":2}");
        client.write_all(&bytes).await.expect("write frames");
        drop(client);

        assert_eq!(reader.read_frame().await.unwrap(), Some(br#"{"a":1}"#.to_vec()));
        assert_eq!(reader.read_frame().await.unwrap(), Some(br#"{"b":2}"#.to_vec()));
        assert_eq!(reader.read_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn rejects_excessive_content_length() {
        let (mut client, server) = tokio::io::duplex(16_384);
        let mut reader = FrameReader::new(server);

        client
            .write_all(b"Content-Length: 999999\r\n\r\n")
            .await
            .expect("write header");
        client.flush().await.expect("flush");
        drop(client);

        assert!(reader.read_frame().await.is_err());
    }

    #[tokio::test]
    async fn rejects_frames_without_length() {
        let (mut client, server) = tokio::io::duplex(16_384);
        let mut reader = FrameReader::new(server);

        client
            .write_all(b"Content-Type: json\r\n\r\n{}")
            .await
            .expect("write frame");
        drop(client);

        assert!(reader.read_frame().await.is_err());
    }

    #[tokio::test]
    async fn writer_stamps_increasing_sequence_numbers() {
        let (client, server) = tokio::io::duplex(16_384);
        let (writer, _task) = FrameWriter::spawn(server);
        let mut reader = FrameReader::new(client);

        let request = Request {
            seq: 7,
            command: "threads".to_string(),
            arguments: json!(null),
        };
        writer
            .send(ProtocolMessage::Response(condor_protocol::Response::success(&request, None)))
            .await
            .expect("send response");
        writer
            .send(ProtocolMessage::Event(Event::new("initialized")))
            .await
            .expect("send event");

        let first: serde_json::Value =
            serde_json::from_slice(&reader.read_frame().await.unwrap().unwrap()).unwrap();
        let second: serde_json::Value =
            serde_json::from_slice(&reader.read_frame().await.unwrap().unwrap()).unwrap();
        assert_eq!(first["seq"], json!(1));
        assert_eq!(first["request_seq"], json!(7));
        assert_eq!(second["seq"], json!(2));
        assert_eq!(second["event"], json!("initialized"));
    }
}
