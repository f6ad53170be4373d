
pub const PMAP_PROG:u32 = 100000;
pub const PMAP_VERS:u32 = 2;
pub const PMAP_PORT:u16 = 111;

pub const PMAPPROC_GETPORT:u32 = 3;     // (mapping) -> unsigned int

use std::io::{self, Error, ErrorKind};
use std::net::IpAddr;
use std::time::Duration;

use super::{IPPROTO_TCP, IPPROTO_UDP};
use super::xdr_pack;
use super::tcp_clients::TcpClient;
use super::udp_clients::BroadcastUdpClient;
use crate::xdr::Unpacker;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Protocol {
	TCP,
	UDP,
}

impl Protocol {
	pub fn to_u32(self) -> u32 { match self {
		Protocol::TCP => IPPROTO_TCP,
		Protocol::UDP => IPPROTO_UDP,
	}}
}

#[derive(Debug, Clone, Copy)]
pub struct Mapping {
	pub program: u32,
	pub version: u32,
	pub protocol: Protocol,
	pub port: u32,		// XDR encodes it as a u32 for alignment
}

pub struct TcpPortMapperClient {
	tcp_client: TcpClient,
}

impl TcpPortMapperClient {

	pub fn new(host:&str) -> io::Result<Self> {
		let tcp_client = TcpClient::connect((host, PMAP_PORT), PMAP_PROG, PMAP_VERS)?;
		Ok(Self{ tcp_client })
	}

	pub fn get_port(&mut self, m:&Mapping) -> io::Result<u16> {
		self.tcp_client.start_call(PMAPPROC_GETPORT)?;
		xdr_pack::pack_mapping(&mut self.tcp_client.packer, m.program, m.version, m.protocol.to_u32(), m.port)?;
		self.tcp_client.do_call()?;

		let port:u32 = self.tcp_client.unpacker.unpack_u32()?;
		if !self.tcp_client.unpacker.all_data_consumed() {
			return Err(Error::new(ErrorKind::InvalidData, "Data unexpectedly left over in unpacker after unpacking port"));
		}

		match port {
			0 => Err(Error::new(ErrorKind::NotFound, "Program is not registered with the port mapper")),
			p if p > u16::MAX as u32 => Err(Error::new(ErrorKind::InvalidData, "Port mapper returned a port outside the u16 range")),
			p => Ok(p as u16),
		}
	}

}

/// Broadcasts GETPORT for `m` and returns the hosts that have the program registered.
pub fn broadcast_get_port(m:&Mapping, listen:Duration) -> io::Result<Vec<(IpAddr, u16)>> {
	let mut client = BroadcastUdpClient::bind(PMAP_PORT, PMAP_PROG, PMAP_VERS, listen)?;
	client.start_call(PMAPPROC_GETPORT)?;
	xdr_pack::pack_mapping(&mut client.packer, m.program, m.version, m.protocol.to_u32(), m.port)?;

	let mut hosts = vec![];
	let mut unpacker = Unpacker::new();
	for (addr, body) in client.make_call()? {
		unpacker.reset(&body);
		let port = unpacker.unpack_u32()?;
		if port != 0 && port <= u16::MAX as u32 && !hosts.iter().any(|(ip, _)| *ip == addr.ip()) {
			hosts.push((addr.ip(), port as u16));
		}
	}
	Ok(hosts)
}
