//! Frame-oriented transport abstraction (spec §4.B): a small
//! WebSocket-like framing over either a TLS stream or a plain TCP stream,
//! carrying the text (encrypted JSON) and binary (streaming) frames named
//! in spec §4.D. Framing is `[1-byte kind][4-byte BE length][payload]`.

use crate::error::{ProtocolError, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;

pub const MAX_FRAME_SIZE: usize = 50 * 1024 * 1024;

const KIND_TEXT: u8 = 0;
const KIND_BINARY: u8 = 1;

#[derive(Debug, Clone)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

/// A connection accepted on either the secure or plain listener (spec
/// §4.B "two listening sockets ... exposed concurrently").
pub enum Connection {
    Secure(TlsStream<TcpStream>),
    Plain(TcpStream),
}

impl Connection {
    pub async fn read_frame(&mut self) -> Result<Frame> {
        match self {
            Connection::Secure(s) => read_frame(s).await,
            Connection::Plain(s) => read_frame(s).await,
        }
    }

    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        match self {
            Connection::Secure(s) => write_frame(s, frame).await,
            Connection::Plain(s) => write_frame(s, frame).await,
        }
    }

    pub fn peer_addr(&self) -> Option<std::net::SocketAddr> {
        match self {
            Connection::Secure(s) => s.get_ref().0.peer_addr().ok(),
            Connection::Plain(s) => s.peer_addr().ok(),
        }
    }
}

async fn read_frame<S: AsyncRead + Unpin>(stream: &mut S) -> Result<Frame> {
    let mut header = [0u8; 5];
    stream.read_exact(&mut header).await?;
    let kind = header[0];
    let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: len,
            limit: MAX_FRAME_SIZE,
        });
    }
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    match kind {
        KIND_TEXT => {
            let text = String::from_utf8(payload)
                .map_err(|e| ProtocolError::Protocol(format!("text frame not utf-8: {e}")))?;
            Ok(Frame::Text(text))
        }
        KIND_BINARY => Ok(Frame::Binary(payload)),
        other => Err(ProtocolError::Protocol(format!("unknown frame kind {other}"))),
    }
}

async fn write_frame<S: AsyncWrite + Unpin>(stream: &mut S, frame: &Frame) -> Result<()> {
    let (kind, payload): (u8, &[u8]) = match frame {
        Frame::Text(t) => (KIND_TEXT, t.as_bytes()),
        Frame::Binary(b) => (KIND_BINARY, b.as_slice()),
    };
    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: payload.len(),
            limit: MAX_FRAME_SIZE,
        });
    }
    let mut header = Vec::with_capacity(5);
    header.push(kind);
    header.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    stream.write_all(&header).await?;
    stream.write_all(payload).await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn round_trips_text_and_binary_frames() {
        let (mut a, mut b) = duplex(4096);
        write_frame(&mut a, &Frame::Text("hello".into())).await.unwrap();
        let got = read_frame(&mut b).await.unwrap();
        assert!(matches!(got, Frame::Text(t) if t == "hello"));

        write_frame(&mut a, &Frame::Binary(vec![1, 2, 3])).await.unwrap();
        let got = read_frame(&mut b).await.unwrap();
        assert!(matches!(got, Frame::Binary(v) if v == vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn rejects_oversized_frame_header() {
        let (mut a, mut b) = duplex(16);
        let mut header = vec![KIND_BINARY];
        header.extend_from_slice(&((MAX_FRAME_SIZE + 1) as u32).to_be_bytes());
        a.write_all(&header).await.unwrap();
        let result = read_frame(&mut b).await;
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge { .. })));
    }
}
