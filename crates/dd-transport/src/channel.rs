//! The abstract `Channel` the core consumes (§1): `NewMessage` / `Send` /
//! `Receive` over a multipart message. The serialization framework itself is
//! out of scope; this module only specifies the interface and ships one
//! concrete length-prefixed TCP implementation of it.

use dd_types::Part;
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};

#[derive(thiserror::Error, Debug)]
pub enum ChannelError {
    #[error("channel io error: {0}")]
    Io(#[from] io::Error),
    #[error("multipart message exceeded {0} parts")]
    TooManyParts(usize),
}

/// A named, multipart, ordered byte-message transport.
///
/// `new_message` exists as a distinct step from `send` so that implementations
/// backed by a zero-copy arena can hand out a part buffer up front; the TCP
/// implementation below just allocates a `Vec<u8>`.
pub trait Channel {
    fn new_message(&self, size_hint: usize) -> Part {
        Vec::with_capacity(size_hint)
    }

    fn send(&mut self, parts: Vec<Part>) -> Result<(), ChannelError>;

    fn receive(&mut self) -> Result<Vec<Part>, ChannelError>;
}

/// Maximum part count accepted by `TcpChannel::receive`, guarding against a
/// corrupt length prefix turning into an unbounded allocation loop.
const MAX_PARTS: usize = 1 << 16;

/// One TCP connection framed as `[u32 part_count][u32 len, bytes]*`, all
/// fields little-endian (§6 wire format).
pub struct TcpChannel {
    stream: TcpStream,
}

impl TcpChannel {
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self, ChannelError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }

    pub fn from_stream(stream: TcpStream) -> Result<Self, ChannelError> {
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }
}

impl Channel for TcpChannel {
    fn send(&mut self, parts: Vec<Part>) -> Result<(), ChannelError> {
        if parts.len() > MAX_PARTS {
            return Err(ChannelError::TooManyParts(parts.len()));
        }
        self.stream.write_all(&(parts.len() as u32).to_le_bytes())?;
        for part in &parts {
            self.stream.write_all(&(part.len() as u32).to_le_bytes())?;
            self.stream.write_all(part)?;
        }
        self.stream.flush()?;
        Ok(())
    }

    fn receive(&mut self) -> Result<Vec<Part>, ChannelError> {
        let mut count_buf = [0u8; 4];
        self.stream.read_exact(&mut count_buf)?;
        let count = u32::from_le_bytes(count_buf) as usize;
        if count > MAX_PARTS {
            return Err(ChannelError::TooManyParts(count));
        }
        let mut parts = Vec::with_capacity(count);
        for _ in 0..count {
            let mut len_buf = [0u8; 4];
            self.stream.read_exact(&mut len_buf)?;
            let len = u32::from_le_bytes(len_buf) as usize;
            let mut part = vec![0u8; len];
            self.stream.read_exact(&mut part)?;
            parts.push(part);
        }
        Ok(parts)
    }
}

/// A bound listener handing out one `TcpChannel` per accepted connection.
pub struct TcpChannelListener {
    listener: TcpListener,
}

impl TcpChannelListener {
    pub fn bind(addr: impl ToSocketAddrs) -> Result<Self, ChannelError> {
        Ok(Self {
            listener: TcpListener::bind(addr)?,
        })
    }

    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    pub fn accept(&self) -> Result<TcpChannel, ChannelError> {
        let (stream, _) = self.listener.accept()?;
        TcpChannel::from_stream(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn round_trips_a_multipart_message() {
        let listener = TcpChannelListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let mut ch = listener.accept().unwrap();
            let parts = ch.receive().unwrap();
            ch.send(parts).unwrap();
        });

        let mut client = TcpChannel::connect(addr).unwrap();
        let sent = vec![b"hello".to_vec(), vec![], b"world".to_vec()];
        client.send(sent.clone()).unwrap();
        let echoed = client.receive().unwrap();
        assert_eq!(echoed, sent);

        server.join().unwrap();
    }

    #[test]
    fn rejects_part_counts_above_the_cap() {
        let listener = TcpChannelListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut client = TcpChannel::connect(addr).unwrap();
        let err = client.send(vec![vec![]; MAX_PARTS + 1]).unwrap_err();
        assert!(matches!(err, ChannelError::TooManyParts(_)));
    }
}
