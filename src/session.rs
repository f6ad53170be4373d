// The one connection to the generator.  A transport fault on any command closes the link, waits the
// reconnect delay and makes a single discovery attempt with the strategy that found the instrument.

use std::io;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::link::{pause, LinkProvider, SettleProfile, SettledLink};
use crate::scpi::{self, Command};

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 2_000;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub timeout: Duration,
    pub reconnect_delay: Duration,
    pub settle: SettleProfile,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            settle: SettleProfile::default(),
        }
    }
}

impl SessionConfig {
    pub fn immediate() -> Self {
        SessionConfig {
            reconnect_delay: Duration::ZERO,
            settle: SettleProfile::none(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Discovery {
    // Probe *IDN? on every admitted address, accept the first naming both vendor and model
    IdentityMatch { address_filter: Option<String>, vendor: String, model: String },
    // First address containing `token`; *IDN? is still read for the identity
    AddressMatch { token: String },
}

impl Discovery {
    pub fn identity(vendor: &str, model: &str) -> Self {
        Discovery::IdentityMatch { address_filter: None, vendor: vendor.to_owned(), model: model.to_owned() }
    }

    pub fn address_token(token: &str) -> Self {
        Discovery::AddressMatch { token: token.to_owned() }
    }

    pub fn rigol_dg1022() -> Self {
        Self::identity("RIGOL", "DG1022")
    }

    pub fn with_address_filter(self, filter: &str) -> Self {
        match self {
            Discovery::IdentityMatch { vendor, model, .. } => {
                Discovery::IdentityMatch { address_filter: Some(filter.to_owned()), vendor, model }
            }
            other => other,
        }
    }

    fn admits(&self, address: &str) -> bool {
        match self {
            Discovery::IdentityMatch { address_filter: Some(f), .. } => address.contains(f.as_str()),
            Discovery::IdentityMatch { address_filter: None, .. } => true,
            Discovery::AddressMatch { token } => address.contains(token.as_str()),
        }
    }

    fn accepts(&self, idn: &str) -> bool {
        match self {
            Discovery::IdentityMatch { vendor, model, .. } => idn.contains(vendor.as_str()) && idn.contains(model.as_str()),
            Discovery::AddressMatch { .. } => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub manufacturer: String,
    pub model: String,
    pub serial_num: String,
    pub fw_version: String,
}

impl Identity {
    pub fn parse(idn: &str) -> Result<Self> {
        let mut fields = idn.trim().split(',').map(|f| f.trim().to_owned());
        let manufacturer = fields.next().unwrap_or_default();
        let model = fields.next().unwrap_or_default();
        if manufacturer.is_empty() || model.is_empty() {
            return Err(Error::malformed("*IDN?", idn));
        }
        Ok(Identity {
            manufacturer,
            model,
            serial_num: fields.next().unwrap_or_default(),
            fw_version: fields.next().unwrap_or_default(),
        })
    }
}

pub struct Session {
    provider: Box<dyn LinkProvider>,
    link: Option<SettledLink>,
    address: Option<String>,
    identity: Option<Identity>,
    discovery: Option<Discovery>,
    config: SessionConfig,
}

impl Session {
    pub fn new(provider: Box<dyn LinkProvider>, config: SessionConfig) -> Self {
        Session { provider, link: None, address: None, identity: None, discovery: None, config }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    // Nothing accepted: Comm with the last probe fault if any probe faulted, NotFound otherwise
    pub fn discover_and_connect(&mut self, discovery: &Discovery) -> Result<Identity> {
        if self.is_connected() {
            log::info!("session: closing the current link before discovery");
            self.disconnect();
        }
        self.discovery = Some(discovery.clone());

        let addresses = self.provider.list_addresses()?;
        log::debug!("session: {} candidate address(es)", addresses.len());

        let mut last_fault: Option<io::Error> = None;
        for address in addresses.iter().filter(|a| discovery.admits(a)) {
            match self.probe(address, discovery) {
                Ok(Some((link, identity))) => {
                    log::info!(
                        "session: connected to {} ({} {})",
                        address,
                        identity.manufacturer,
                        identity.model
                    );
                    self.link = Some(link);
                    self.address = Some(address.clone());
                    self.identity = Some(identity.clone());
                    return Ok(identity);
                }
                Ok(None) => log::debug!("session: {} is not the requested instrument", address),
                Err(e) => {
                    log::warn!("session: probing {} failed: {}", address, e);
                    last_fault = Some(e);
                }
            }
        }

        match last_fault {
            Some(e) => Err(Error::Comm(e)),
            None => {
                log::warn!("session: no instrument matched {:?}", discovery);
                Err(Error::NotFound)
            }
        }
    }

    fn probe(&mut self, address: &str, discovery: &Discovery) -> io::Result<Option<(SettledLink, Identity)>> {
        let mut link = SettledLink::new(self.provider.open(address)?, self.config.settle.clone());

        let reply = match link.set_timeout(self.config.timeout).and_then(|_| link.ask(&scpi::identify())) {
            Ok(reply) => reply,
            Err(e) => {
                close_quietly(&mut link, address);
                return Err(e);
            }
        };

        if !discovery.accepts(&reply) {
            close_quietly(&mut link, address);
            return Ok(None);
        }

        match Identity::parse(&reply) {
            Ok(identity) => Ok(Some((link, identity))),
            Err(e) => {
                log::debug!("session: {}", e);
                close_quietly(&mut link, address);
                Ok(None)
            }
        }
    }

    pub fn disconnect(&mut self) {
        let mut link = match self.link.take() {
            Some(link) => link,
            None => {
                log::info!("session: no instrument to disconnect");
                return;
            }
        };

        if let Err(e) = link.send(&scpi::output(false)) {
            log::warn!("session: could not switch the output off before disconnecting: {}", e);
        }
        if let Err(e) = link.close() {
            log::warn!("session: error while closing the link: {}", e);
        }
        log::info!("session: disconnected from {}", self.address.as_deref().unwrap_or("?"));
        self.address = None;
        self.identity = None;
    }

    pub fn close(&mut self) {
        self.disconnect();
        self.discovery = None;
    }

    pub fn send_command(&mut self, cmd: &Command) -> Result<()> {
        let link = self.link.as_mut().ok_or(Error::NotConnected)?;
        log::trace!("session: -> {}", cmd);
        match link.send(cmd) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.recover(cmd, e)),
        }
    }

    pub fn send_query(&mut self, cmd: &Command) -> Result<String> {
        let link = self.link.as_mut().ok_or(Error::NotConnected)?;
        log::trace!("session: -> {}", cmd);
        match link.ask(cmd) {
            Ok(reply) => {
                log::trace!("session: <- {}", reply);
                Ok(reply)
            }
            Err(e) => Err(self.recover(cmd, e)),
        }
    }

    fn recover(&mut self, cmd: &Command, fault: io::Error) -> Error {
        log::warn!("session: {} failed: {}", cmd, fault);
        match self.handle_disconnection() {
            Ok(_) => Error::Recovered(fault),
            Err(e) => e,
        }
    }

    pub fn handle_disconnection(&mut self) -> Result<Identity> {
        log::warn!("session: connection lost, attempting to reconnect");
        if let Some(mut link) = self.link.take() {
            if let Err(e) = link.close() {
                log::debug!("session: ignoring close error on the stale link: {}", e);
            }
        }
        self.address = None;
        self.identity = None;

        let discovery = match self.discovery.clone() {
            Some(d) => d,
            None => return Err(Error::ReconnectFailed(Box::new(Error::NotConnected))),
        };

        pause(self.config.reconnect_delay);
        match self.discover_and_connect(&discovery) {
            Ok(identity) => {
                log::info!("session: reconnected");
                Ok(identity)
            }
            Err(e) => {
                log::error!("session: could not reconnect: {}", e);
                Err(Error::ReconnectFailed(Box::new(e)))
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.is_connected() {
            self.disconnect();
        }
    }
}

fn close_quietly(link: &mut SettledLink, address: &str) {
    if let Err(e) = link.close() {
        log::debug!("session: closing {} after the probe failed: {}", address, e);
    }
}
