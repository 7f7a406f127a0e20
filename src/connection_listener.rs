use std::{
    io::{self, ErrorKind, Read, Write},
    net::{SocketAddr, TcpListener, TcpStream},
};

use log::{debug, warn};

use crate::config::ConfigError;

/// Longest partial command line kept while waiting for its terminator.
pub const MAX_LINE_LEN: usize = 256;

/// Outbound bytes kept for a peer that is not reading. Lines past this are dropped.
pub const MAX_PENDING_OUT: usize = 64 * 1024;

/// Socket reads per `read_lines` call.
const MAX_READS_PER_CALL: usize = 16;

/// Non-blocking listener, polled from the control loop.
pub struct ConnectionListener {
    listener: TcpListener,
}

impl ConnectionListener {
    /// Binds the first address that works.
    pub fn bind(addrs: &[SocketAddr]) -> Result<Self, ConfigError> {
        for addr in addrs {
            match TcpListener::bind(addr).and_then(|l| l.set_nonblocking(true).map(|_| l)) {
                Ok(listener) => return Ok(Self { listener }),
                Err(err) => warn!("cannot listen on {}: {}", addr, err),
            }
        }
        Err(ConfigError::NoValidSocketAddrs)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// `Ok(None)` when nobody is waiting.
    pub fn accept(&self) -> io::Result<Option<Connection>> {
        match self.listener.accept() {
            Ok((stream, peer)) => Connection::new(stream, peer).map(Some),
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn incoming(&self) -> Incoming {
        Incoming(self)
    }
}

/// Connections already waiting, ends at the first empty or failed accept.
pub struct Incoming<'a>(&'a ConnectionListener);

impl<'a> Iterator for Incoming<'a> {
    type Item = Connection;

    fn next(&mut self) -> Option<Self::Item> {
        match self.0.accept() {
            Ok(connection) => connection,
            Err(err) => {
                warn!("accept failed: {}", err);
                None
            }
        }
    }
}

/// Line-oriented client connection.
///
/// Writes never block. Whatever the socket does not take stays queued and goes out
/// on the next `send_line` or `flush`.
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    inbound: Vec<u8>,
    outbound: Vec<u8>,
}

impl Connection {
    fn new(stream: TcpStream, peer: SocketAddr) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            peer,
            inbound: Vec::new(),
            outbound: Vec::new(),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Bytes accepted by `send_line` but not yet taken by the socket.
    pub fn pending_out(&self) -> usize {
        self.outbound.len()
    }

    /// Queues one line and sends as much as the socket takes.
    pub fn send_line(&mut self, line: &str) -> io::Result<()> {
        if self.outbound.len() + line.len() + 1 > MAX_PENDING_OUT {
            debug!("{} is not reading, dropping a line", self.peer);
        } else {
            self.outbound.extend_from_slice(line.as_bytes());
            self.outbound.push(b'\n');
        }
        self.flush()
    }

    /// Sends queued bytes until the socket would block.
    pub fn flush(&mut self) -> io::Result<()> {
        let mut sent = 0;
        let result = loop {
            if sent == self.outbound.len() {
                break Ok(());
            }
            match self.stream.write(&self.outbound[sent..]) {
                Ok(0) => break Err(ErrorKind::WriteZero.into()),
                Ok(n) => sent += n,
                Err(err) if err.kind() == ErrorKind::WouldBlock => break Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => break Err(err),
            }
        };
        self.outbound.drain(..sent);
        result
    }

    /// Complete lines received so far, without terminators. Errors once the peer hung up
    /// or sent more than `MAX_LINE_LEN` bytes without a newline.
    pub fn read_lines(&mut self) -> io::Result<Vec<String>> {
        let mut lines = Vec::new();
        let mut buf = [0u8; MAX_LINE_LEN];
        for _ in 0..MAX_READS_PER_CALL {
            match self.stream.read(&mut buf) {
                Ok(0) => return Err(ErrorKind::UnexpectedEof.into()),
                Ok(n) => self.inbound.extend_from_slice(&buf[..n]),
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }

            while let Some(end) = self.inbound.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.inbound.drain(..=end).collect();
                lines.push(String::from_utf8_lossy(&line).trim().to_owned());
            }
            if self.inbound.len() > MAX_LINE_LEN {
                warn!(
                    "{} sent {} bytes without a newline",
                    self.peer,
                    self.inbound.len()
                );
                self.inbound.clear();
                return Err(io::Error::new(ErrorKind::InvalidData, "command line too long"));
            }
        }
        Ok(lines)
    }
}
