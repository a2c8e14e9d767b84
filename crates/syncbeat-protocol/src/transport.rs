//! Length-prefixed frame transport
//!
//! Each frame is a big-endian `u32` byte count followed by one JSON envelope.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};

use crate::envelope::Envelope;
use crate::error::{ProtocolError, Result};

pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024;

/// Read half: decodes one envelope per frame.
pub struct FrameReader<R> {
    inner: R,
    max_frame: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, max_frame: usize) -> Self {
        Self { inner, max_frame }
    }

    /// Clean EOF before a length prefix maps to [`ProtocolError::ConnectionClosed`].
    pub async fn recv<M: DeserializeOwned>(&mut self) -> Result<Envelope<M>> {
        let len = match self.inner.read_u32().await {
            Ok(len) => len as usize,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(ProtocolError::ConnectionClosed)
            }
            Err(e) => return Err(e.into()),
        };
        if len > self.max_frame {
            return Err(ProtocolError::FrameTooLarge {
                len,
                max: self.max_frame,
            });
        }
        let mut data = vec![0u8; len];
        self.inner.read_exact(&mut data).await?;
        Envelope::from_json(&data)
    }
}

/// Write half: encodes one envelope per frame.
pub struct FrameWriter<W> {
    inner: W,
    max_frame: usize,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W, max_frame: usize) -> Self {
        Self { inner, max_frame }
    }

    pub async fn send<M: Serialize>(&mut self, envelope: &Envelope<M>) -> Result<()> {
        let data = envelope.to_json()?;
        self.send_raw(&data).await
    }

    /// Write an already-encoded envelope body.
    pub async fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > self.max_frame {
            return Err(ProtocolError::FrameTooLarge {
                len: data.len(),
                max: self.max_frame,
            });
        }
        self.inner.write_u32(data.len() as u32).await?;
        self.inner.write_all(data).await?;
        self.inner.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

/// A framed TCP connection.
pub struct MessageTransport {
    stream: TcpStream,
    max_frame: usize,
}

impl MessageTransport {
    pub fn new(stream: TcpStream, max_frame: usize) -> Self {
        let _ = stream.set_nodelay(true);
        Self { stream, max_frame }
    }

    pub async fn connect(addr: impl ToSocketAddrs, max_frame: usize) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::new(stream, max_frame))
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    /// Split into independently owned halves for separate reader and writer tasks.
    pub fn split(self) -> (FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>) {
        let (read, write) = self.stream.into_split();
        (
            FrameReader::new(read, self.max_frame),
            FrameWriter::new(write, self.max_frame),
        )
    }
}

/// Server-side listener
pub struct TransportListener {
    listener: TcpListener,
    max_frame: usize,
}

impl TransportListener {
    pub async fn bind(addr: impl ToSocketAddrs, max_frame: usize) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            max_frame,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn accept(&self) -> Result<(MessageTransport, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await?;
        Ok((MessageTransport::new(stream, self.max_frame), addr))
    }
}
