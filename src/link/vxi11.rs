// InstrumentLink over VXI-11.  Addresses are TCPIP0::<host>::<device>::INSTR; they carry no serial number.

use std::io::{self, Error, ErrorKind};
use std::time::Duration;

use super::{InstrumentLink, LinkProvider};
use crate::rpc::port_mapping::{self, Mapping, Protocol};
use crate::vxi11::{CoreClient, DEFAULT_DEVICE_NAME, DEVICE_CORE_PROG, DEVICE_CORE_VERS};

pub const DEFAULT_LISTEN_MS: u64 = 1000;

pub fn visa_address(host: &str, device: &str) -> String {
    format!("TCPIP0::{}::{}::INSTR", host, device)
}

// TCPIP[n]::host[::device]::INSTR or a bare host
pub fn parse_address(address: &str) -> io::Result<(String, String)> {
    let parts: Vec<&str> = address.trim().split("::").collect();
    let bad = || Error::new(ErrorKind::InvalidInput, format!("not a VXI-11 address: {:?}", address));

    match parts.as_slice() {
        [host] if !host.is_empty() => Ok((host.to_string(), DEFAULT_DEVICE_NAME.to_owned())),
        [iface, host, "INSTR"] if iface.to_ascii_uppercase().starts_with("TCPIP") => {
            Ok((host.to_string(), DEFAULT_DEVICE_NAME.to_owned()))
        }
        [iface, host, device, "INSTR"] if iface.to_ascii_uppercase().starts_with("TCPIP") => {
            Ok((host.to_string(), device.to_string()))
        }
        _ => Err(bad()),
    }
}

pub struct Vxi11Link {
    core: CoreClient,
    address: String,
    linked: bool,
}

impl Vxi11Link {
    pub fn open(address: &str) -> io::Result<Self> {
        let (host, device) = parse_address(address)?;
        let mut core = CoreClient::new(&host)?;
        core.set_timeout(Duration::from_millis(crate::session::DEFAULT_TIMEOUT_MS))?;
        core.create_link(&device)?;
        log::debug!("vxi11: opened {}", address);
        Ok(Vxi11Link { core, address: address.to_owned(), linked: true })
    }
}

impl InstrumentLink for Vxi11Link {
    fn write(&mut self, cmd: &str) -> io::Result<()> {
        self.core.write(cmd.as_bytes())
    }

    fn read(&mut self) -> io::Result<String> {
        let raw = self.core.read()?;
        let text = String::from_utf8(raw)
            .map_err(|_| Error::new(ErrorKind::InvalidData, "Unable to parse response as UTF-8"))?;
        Ok(text.trim_end_matches(|c| c == '\n' || c == '\r').to_owned())
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.core.set_timeout(timeout)
    }

    fn close(&mut self) -> io::Result<()> {
        if !self.linked {
            return Ok(());
        }
        self.linked = false;
        self.core.destroy_link()
    }
}

impl Drop for Vxi11Link {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::debug!("vxi11: destroying link to {} failed: {}", self.address, e);
        }
    }
}

pub struct Vxi11Provider {
    hosts: Vec<String>,
    broadcast: bool,
    listen: Duration,
}

impl Vxi11Provider {
    pub fn new() -> Self {
        Vxi11Provider { hosts: vec![], broadcast: true, listen: Duration::from_millis(DEFAULT_LISTEN_MS) }
    }

    pub fn with_hosts<S: AsRef<str>>(hosts: &[S]) -> Self {
        Vxi11Provider {
            hosts: hosts.iter().map(|h| h.as_ref().to_owned()).collect(),
            broadcast: false,
            listen: Duration::from_millis(DEFAULT_LISTEN_MS),
        }
    }

    pub fn broadcast(mut self, enabled: bool) -> Self {
        self.broadcast = enabled;
        self
    }

    pub fn listen_for(mut self, listen: Duration) -> Self {
        self.listen = listen;
        self
    }
}

impl Default for Vxi11Provider {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkProvider for Vxi11Provider {
    fn list_addresses(&mut self) -> io::Result<Vec<String>> {
        let mut addresses: Vec<String> = self
            .hosts
            .iter()
            .map(|h| if h.contains("::") { h.clone() } else { visa_address(h, DEFAULT_DEVICE_NAME) })
            .collect();

        if self.broadcast {
            let mapping = Mapping {
                program: DEVICE_CORE_PROG,
                version: DEVICE_CORE_VERS,
                protocol: Protocol::TCP,
                port: 0,
            };
            for (ip, port) in port_mapping::broadcast_get_port(&mapping, self.listen)? {
                log::debug!("vxi11: {} answered the broadcast (core port {})", ip, port);
                let address = visa_address(&ip.to_string(), DEFAULT_DEVICE_NAME);
                if !addresses.contains(&address) {
                    addresses.push(address);
                }
            }
        }

        Ok(addresses)
    }

    fn open(&mut self, address: &str) -> io::Result<Box<dyn InstrumentLink>> {
        Ok(Box::new(Vxi11Link::open(address)?))
    }
}
