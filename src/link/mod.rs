// Instrument links: a provider enumerates and opens addresses, a link is one open connection.  SettledLink
// adds the pauses the DG1022 firmware needs after each class of command.

use std::io;
use std::thread;
use std::time::Duration;

use crate::scpi::Command;

pub mod mock;
pub mod vxi11;

pub use self::mock::MockBench;
pub use self::vxi11::Vxi11Provider;

pub trait InstrumentLink: Send {
    fn write(&mut self, cmd: &str) -> io::Result<()>;

    // One reply, termination characters removed
    fn read(&mut self) -> io::Result<String>;

    fn query(&mut self, cmd: &str) -> io::Result<String> {
        self.write(cmd)?;
        self.read()
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    fn close(&mut self) -> io::Result<()>;
}

pub trait LinkProvider: Send {
    fn list_addresses(&mut self) -> io::Result<Vec<String>>;

    fn open(&mut self, address: &str) -> io::Result<Box<dyn InstrumentLink>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleClass {
    Generic,
    Output,
    Burst,
    Upload,
    Frequency,
}

// Pause after each class of command; `query` is the wait between the write and the read of a query
#[derive(Debug, Clone, PartialEq)]
pub struct SettleProfile {
    pub generic: Duration,
    pub output: Duration,
    pub burst: Duration,
    pub upload: Duration,
    pub frequency: Duration,
    pub query: Duration,
}

impl SettleProfile {
    pub fn none() -> Self {
        SettleProfile {
            generic: Duration::ZERO,
            output: Duration::ZERO,
            burst: Duration::ZERO,
            upload: Duration::ZERO,
            frequency: Duration::ZERO,
            query: Duration::ZERO,
        }
    }

    pub fn after(&self, class: SettleClass) -> Duration {
        match class {
            SettleClass::Generic => self.generic,
            SettleClass::Output => self.output,
            SettleClass::Burst => self.burst,
            SettleClass::Upload => self.upload,
            SettleClass::Frequency => self.frequency,
        }
    }
}

impl Default for SettleProfile {
    fn default() -> Self {
        SettleProfile {
            generic: Duration::from_millis(100),
            output: Duration::from_millis(500),
            burst: Duration::from_millis(500),
            upload: Duration::from_millis(600),
            frequency: Duration::from_millis(300),
            query: Duration::from_millis(500),
        }
    }
}

pub(crate) fn pause(d: Duration) {
    if !d.is_zero() {
        thread::sleep(d);
    }
}

pub struct SettledLink {
    inner: Box<dyn InstrumentLink>,
    profile: SettleProfile,
}

impl SettledLink {
    pub fn new(inner: Box<dyn InstrumentLink>, profile: SettleProfile) -> Self {
        SettledLink { inner, profile }
    }

    pub fn send(&mut self, cmd: &Command) -> io::Result<()> {
        self.inner.write(cmd.as_str())?;
        pause(self.profile.after(cmd.class()));
        Ok(())
    }

    pub fn ask(&mut self, cmd: &Command) -> io::Result<String> {
        if self.profile.query.is_zero() {
            return self.inner.query(cmd.as_str());
        }
        self.inner.write(cmd.as_str())?;
        pause(self.profile.query);
        self.inner.read()
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.inner.set_timeout(timeout)
    }

    pub fn close(&mut self) -> io::Result<()> {
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scpi;
    use std::time::Instant;

    #[test]
    fn default_profile_keeps_firmware_intervals() {
        let p = SettleProfile::default();
        assert_eq!(p.after(SettleClass::Generic), Duration::from_millis(100));
        assert_eq!(p.after(SettleClass::Burst), Duration::from_millis(500));
        assert_eq!(p.after(SettleClass::Output), Duration::from_millis(500));
        assert_eq!(p.after(SettleClass::Upload), Duration::from_millis(600));
        assert_eq!(p.after(SettleClass::Frequency), Duration::from_millis(300));
        assert_eq!(p.query, Duration::from_millis(500));
    }

    #[test]
    fn settled_link_forwards_verbatim() {
        let bench = MockBench::new();
        bench.add_instrument("SIM::1", "RIGOL TECHNOLOGIES,DG1022 ,DG1D0000001,00.03.00");
        let mut provider = bench.clone();
        let mut link = SettledLink::new(provider.open("SIM::1").unwrap(), SettleProfile::none());

        link.send(&scpi::output(true)).unwrap();
        let idn = link.ask(&scpi::identify()).unwrap();

        assert!(idn.starts_with("RIGOL"));
        assert_eq!(bench.written("SIM::1"), vec!["OUTP ON", "*IDN?"]);
    }

    #[test]
    fn settled_link_pauses_by_class() {
        let bench = MockBench::new();
        bench.add_instrument("SIM::1", "RIGOL TECHNOLOGIES,DG1022 ,DG1D0000001,00.03.00");
        let mut provider = bench.clone();
        let profile = SettleProfile { upload: Duration::from_millis(25), query: Duration::from_millis(15), ..SettleProfile::none() };
        let mut link = SettledLink::new(provider.open("SIM::1").unwrap(), profile);

        let start = Instant::now();
        link.send(&scpi::data_dac_volatile(&[0, 16383])).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(25));

        let start = Instant::now();
        link.ask(&scpi::identify()).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(15));
    }
}
