use std::collections::VecDeque;
use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use foundation_http::wire::simple_http::client::{
    Connection, HttpClientError, TargetConfig, Transport,
};

/// What a [`ScriptedTransport`] observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportLog {
    /// Fresh connections handed out
    pub opened: usize,
    /// Acquisitions served by a recycled connection
    pub reused: usize,
    /// Connections handed back for reuse
    pub recycled: usize,
    /// Connections closed
    pub closed: usize,
    /// Target of every fresh connection, in order
    pub targets: Vec<TargetConfig>,
    /// Bytes written, one entry per fresh connection
    pub written: Vec<Vec<u8>>,
    /// Read timeouts applied, in order
    pub read_timeouts: Vec<Option<Duration>>,
}

fn lock(log: &Mutex<TransportLog>) -> MutexGuard<'_, TransportLog> {
    log.lock().unwrap_or_else(PoisonError::into_inner)
}

struct ScriptedConnection {
    index: usize,
    target: TargetConfig,
    input: Cursor<Vec<u8>>,
    log: Arc<Mutex<TransportLog>>,
    closed: bool,
}

impl Read for ScriptedConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "connection closed"));
        }
        self.input.read(buf)
    }
}

impl Write for ScriptedConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "connection closed"));
        }
        lock(&self.log).written[self.index].extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Connection for ScriptedConnection {
    fn target(&self) -> &TargetConfig {
        &self.target
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        lock(&self.log).read_timeouts.push(timeout);
        Ok(())
    }

    fn close_socket_and_streams(&mut self) {
        if !self.closed {
            self.closed = true;
            lock(&self.log).closed += 1;
        }
    }
}

/// Transport whose connections replay scripted response bytes.
///
/// Each fresh connection takes the next script; a script may hold several
/// responses for connections that get reused. Recycled connections are kept
/// and handed out again to the same target.
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Vec<u8>>>,
    idle: Mutex<Vec<Box<dyn Connection>>>,
    log: Arc<Mutex<TransportLog>>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            idle: Mutex::new(Vec::new()),
            log: Arc::new(Mutex::new(TransportLog::default())),
        }
    }

    /// Queues the bytes the next fresh connection will read.
    #[must_use]
    pub fn with_connection(self, script: impl Into<Vec<u8>>) -> Self {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(script.into());
        self
    }

    /// Snapshot of everything observed so far.
    #[must_use]
    pub fn log(&self) -> TransportLog {
        lock(&self.log).clone()
    }

    /// Bytes written to the `index`th fresh connection, as text.
    #[must_use]
    pub fn written(&self, index: usize) -> String {
        lock(&self.log)
            .written
            .get(index)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default()
    }

    /// Connections currently waiting for reuse.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Transport for ScriptedTransport {
    fn acquire(
        &self,
        target: &TargetConfig,
        _connect_timeout: Option<Duration>,
    ) -> Result<Box<dyn Connection>, HttpClientError> {
        {
            let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(position) = idle.iter().position(|conn| conn.target() == target) {
                lock(&self.log).reused += 1;
                return Ok(idle.remove(position));
            }
        }

        let Some(script) = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
        else {
            return Err(HttpClientError::ConnectionFailed(format!(
                "no scripted connection left for {target}"
            )));
        };

        let mut log = lock(&self.log);
        let index = log.written.len();
        log.opened += 1;
        log.targets.push(target.clone());
        log.written.push(Vec::new());
        tracing::debug!("Scripted connection {index} opened to {target}");

        Ok(Box::new(ScriptedConnection {
            index,
            target: target.clone(),
            input: Cursor::new(script),
            log: Arc::clone(&self.log),
            closed: false,
        }))
    }

    fn recycle(&self, connection: Box<dyn Connection>) {
        lock(&self.log).recycled += 1;
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(connection);
    }
}
