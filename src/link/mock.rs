// Simulated bench of instruments.  Clones share state, so a test hands one clone to the Session and keeps
// another to script replies, inject faults and read back what reached the wire.

use std::collections::HashMap;
use std::io::{self, Error, ErrorKind};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{InstrumentLink, LinkProvider};

#[derive(Debug)]
struct Instrument {
    address: String,
    idn: Option<String>,
    online: bool,
    replies: HashMap<String, String>,
    written: Vec<String>,
}

#[derive(Debug, Default)]
struct BenchState {
    instruments: Vec<Instrument>,
    // (command prefix, failures left)
    faults: Vec<(String, usize)>,
    list_fails: bool,
    list_calls: usize,
    open_calls: usize,
    close_calls: usize,
    timeouts: Vec<Duration>,
}

impl BenchState {
    fn instrument(&mut self, address: &str) -> Option<&mut Instrument> {
        self.instruments.iter_mut().find(|i| i.address == address)
    }

    fn take_fault(&mut self, cmd: &str) -> bool {
        match self.faults.iter_mut().find(|(prefix, n)| *n > 0 && cmd.starts_with(prefix.as_str())) {
            Some((_, n)) => {
                *n -= 1;
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockBench {
    state: Arc<Mutex<BenchState>>,
}

impl MockBench {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BenchState> {
        // A panicking test thread must not hide the bench from the others
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn add_instrument(&self, address: &str, idn: &str) {
        self.push(address, Some(idn.to_owned()));
    }

    // Never answers any query
    pub fn add_silent_instrument(&self, address: &str) {
        self.push(address, None);
    }

    fn push(&self, address: &str, idn: Option<String>) {
        self.lock().instruments.push(Instrument {
            address: address.to_owned(),
            idn,
            online: true,
            replies: HashMap::new(),
            written: vec![],
        });
    }

    pub fn respond(&self, address: &str, query: &str, reply: &str) {
        if let Some(inst) = self.lock().instrument(address) {
            inst.replies.insert(query.to_owned(), reply.to_owned());
        }
    }

    // Offline instruments refuse open and fail I/O on links already open
    pub fn set_online(&self, address: &str, online: bool) {
        if let Some(inst) = self.lock().instrument(address) {
            inst.online = online;
        }
    }

    pub fn fail_on(&self, prefix: &str, times: usize) {
        self.lock().faults.push((prefix.to_owned(), times));
    }

    pub fn fail_listing(&self, fails: bool) {
        self.lock().list_fails = fails;
    }

    pub fn written(&self, address: &str) -> Vec<String> {
        self.lock().instrument(address).map(|i| i.written.clone()).unwrap_or_default()
    }

    pub fn clear_written(&self) {
        for inst in self.lock().instruments.iter_mut() {
            inst.written.clear();
        }
    }

    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    pub fn open_calls(&self) -> usize {
        self.lock().open_calls
    }

    pub fn close_calls(&self) -> usize {
        self.lock().close_calls
    }

    pub fn timeouts(&self) -> Vec<Duration> {
        self.lock().timeouts.clone()
    }
}

impl LinkProvider for MockBench {
    fn list_addresses(&mut self) -> io::Result<Vec<String>> {
        let mut state = self.lock();
        state.list_calls += 1;
        if state.list_fails {
            return Err(Error::new(ErrorKind::Other, "resource enumeration failed"));
        }
        Ok(state.instruments.iter().map(|i| i.address.clone()).collect())
    }

    fn open(&mut self, address: &str) -> io::Result<Box<dyn InstrumentLink>> {
        let mut state = self.lock();
        state.open_calls += 1;
        match state.instrument(address) {
            Some(inst) if inst.online => {}
            Some(_) => return Err(Error::new(ErrorKind::ConnectionRefused, "instrument is offline")),
            None => return Err(Error::new(ErrorKind::NotFound, "no such resource")),
        }
        Ok(Box::new(MockLink {
            bench: self.clone(),
            address: address.to_owned(),
            pending: None,
            closed: false,
        }))
    }
}

struct MockLink {
    bench: MockBench,
    address: String,
    pending: Option<String>,
    closed: bool,
}

impl InstrumentLink for MockLink {
    fn write(&mut self, cmd: &str) -> io::Result<()> {
        if self.closed {
            return Err(Error::new(ErrorKind::NotConnected, "link is closed"));
        }
        let mut state = self.bench.lock();
        let injected = state.take_fault(cmd);
        let inst = state
            .instrument(&self.address)
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "no such resource"))?;
        if !inst.online {
            return Err(Error::new(ErrorKind::BrokenPipe, "instrument went away"));
        }
        if injected {
            return Err(Error::new(ErrorKind::TimedOut, "I/O timeout"));
        }

        inst.written.push(cmd.to_owned());
        if cmd.ends_with('?') {
            self.pending = if cmd == "*IDN?" {
                inst.idn.clone()
            } else {
                inst.replies.get(cmd).cloned()
            };
        }
        Ok(())
    }

    fn read(&mut self) -> io::Result<String> {
        if self.closed {
            return Err(Error::new(ErrorKind::NotConnected, "link is closed"));
        }
        self.pending
            .take()
            .ok_or_else(|| Error::new(ErrorKind::TimedOut, "I/O timeout waiting for a reply"))
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.bench.lock().timeouts.push(timeout);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        self.bench.lock().close_calls += 1;
        Ok(())
    }
}
