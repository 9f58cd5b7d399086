use std::{
    fs::{File, OpenOptions},
    io::{self, Write as _},
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket},
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;
use tracing::debug;

use crate::location::Location;

/// Lines kept in memory by a [`Location::Memory`] writer.
///
/// Cloning the handle shares the underlying buffer, so tests can keep a handle and inspect what the
/// exporter wrote.
#[derive(Clone, Debug, Default)]
pub struct MemoryWriter {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemoryWriter {
    /// Creates an empty `MemoryWriter`.
    pub fn new() -> Self {
        Self::default()
    }

    fn push_payload(&self, payload: &str) {
        let mut lines = self.lines.lock();
        lines.extend(payload.lines().filter(|line| !line.is_empty()).map(str::to_string));
    }

    /// Returns a copy of every line written so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Returns the most recently written line.
    pub fn last_line(&self) -> Option<String> {
        self.lines.lock().last().cloned()
    }

    /// Returns `true` if nothing was written since creation or the last [`clear`](MemoryWriter::clear).
    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    /// Discards every line written so far.
    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

enum UdpState {
    // Intermediate state during send attempts.
    Inconsistent,

    // Socket is not bound yet, or the last send failed.
    Disconnected,

    // Socket is bound, connected and ready to send.
    Ready(UdpSocket),
}

struct UdpClient {
    addr: SocketAddr,
    write_timeout: Duration,
    state: UdpState,
}

impl UdpClient {
    fn connect(&self) -> io::Result<UdpSocket> {
        let socket = match self.addr {
            SocketAddr::V4(_) => UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?,
            SocketAddr::V6(_) => UdpSocket::bind((Ipv6Addr::UNSPECIFIED, 0))?,
        };
        socket.connect(self.addr)?;
        socket.set_write_timeout(Some(self.write_timeout))?;
        debug!(addr = %self.addr, "Connected UDP socket.");
        Ok(socket)
    }

    fn try_send(&mut self, payload: &[u8]) -> io::Result<()> {
        loop {
            let old_state = std::mem::replace(&mut self.state, UdpState::Inconsistent);
            match old_state {
                UdpState::Inconsistent => unreachable!("transitioned _from_ inconsistent state"),
                UdpState::Disconnected => {
                    let socket = self.connect()?;
                    self.state = UdpState::Ready(socket);
                }
                UdpState::Ready(socket) => {
                    let result = socket.send(payload);
                    if result.is_ok() {
                        self.state = UdpState::Ready(socket);
                    } else {
                        self.state = UdpState::Disconnected;
                    }

                    return result.map(|_| ());
                }
            }
        }
    }
}

/// Destination of published payloads.
///
/// Each payload is one or more newline-separated protocol lines.
pub struct Writer {
    inner: Inner,
}

enum Inner {
    None,
    Memory(MemoryWriter),
    Stdout,
    Stderr,
    File(File),
    Udp(UdpClient),
}

impl Writer {
    /// Opens a writer for `location`.
    ///
    /// Files are opened in append mode and created if missing.  UDP sockets are bound lazily on the
    /// first write, and again after a failed write.
    ///
    /// # Errors
    ///
    /// If the file cannot be opened, an error is returned.
    pub fn open(location: &Location, write_timeout: Duration) -> io::Result<Self> {
        let inner = match location {
            Location::None => Inner::None,
            Location::Memory => Inner::Memory(MemoryWriter::new()),
            Location::Stdout => Inner::Stdout,
            Location::Stderr => Inner::Stderr,
            Location::File(path) => Inner::File(OpenOptions::new().create(true).append(true).open(path)?),
            Location::Udp(addr) => {
                Inner::Udp(UdpClient { addr: *addr, write_timeout, state: UdpState::Disconnected })
            }
        };
        Ok(Self { inner })
    }

    /// Creates a writer that stores lines in `memory`.
    pub fn memory(memory: MemoryWriter) -> Self {
        Self { inner: Inner::Memory(memory) }
    }

    /// Returns the in-memory buffer, if this writer keeps lines in memory.
    pub fn as_memory(&self) -> Option<&MemoryWriter> {
        match &self.inner {
            Inner::Memory(memory) => Some(memory),
            _ => None,
        }
    }

    /// Writes one payload.
    ///
    /// # Errors
    ///
    /// If the underlying file, stream or socket fails, the error is returned and the payload is lost.
    pub fn write(&mut self, payload: &str) -> io::Result<()> {
        match &mut self.inner {
            Inner::None => Ok(()),
            Inner::Memory(memory) => {
                memory.push_payload(payload);
                Ok(())
            }
            Inner::Stdout => writeln!(io::stdout().lock(), "{}", payload),
            Inner::Stderr => writeln!(io::stderr().lock(), "{}", payload),
            Inner::File(file) => writeln!(file, "{}", payload),
            Inner::Udp(client) => client.try_send(payload.as_bytes()),
        }
    }
}

impl std::fmt::Debug for Writer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.inner {
            Inner::None => "none",
            Inner::Memory(_) => "memory",
            Inner::Stdout => "stdout",
            Inner::Stderr => "stderr",
            Inner::File(_) => "file",
            Inner::Udp(_) => "udp",
        };
        f.debug_struct("Writer").field("kind", &kind).finish()
    }
}
