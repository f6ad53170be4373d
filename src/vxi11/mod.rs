
// Device core
pub const DEVICE_CORE_PROG:u32  = 0x0607af;
pub const DEVICE_CORE_VERS:u32  = 1;
pub const CREATE_LINK:u32       = 10;
pub const DEVICE_WRITE:u32      = 11;
pub const DEVICE_READ:u32       = 12;
pub const DESTROY_LINK:u32      = 23;

pub const CLIENT_ID:i32 = 3333;
pub const DEFAULT_LOCK_TIMEOUT_MS:u32 = 10000;
pub const DEFAULT_DEVICE_NAME:&str = "inst0";

pub const OPERATION_FLAGS_END_ONLY:i32 = 8;

// Bits of the reason field in a device_read reply
const REASON_END:i32 = 4;

use std::io::{self, Error, ErrorKind};
use std::time::Duration;

use crate::rpc::port_mapping::{TcpPortMapperClient, Mapping, Protocol};
use crate::rpc::tcp_clients::TcpClient;

pub mod xdr_pack;

fn err(msg:&str) -> io::Error { Error::new(ErrorKind::Other, msg) }

// VXI-11 device_error codes shared by every core procedure
fn device_error(code:i32) -> io::Result<()> {
    match code {
        0  => Ok(()),
        1  => Err(err("Syntax error")),
        3  => Err(err("Device not accessible")),
        4  => Err(err("Invalid link identifier")),
        5  => Err(err("Parameter error")),
        6  => Err(err("Channel not established")),
        8  => Err(err("Operation not supported")),
        9  => Err(err("Out of resources")),
        11 => Err(err("Device locked by another link")),
        12 => Err(err("No lock held by this link")),
        15 => Err(Error::new(ErrorKind::TimedOut, "I/O timeout")),
        17 => Err(err("I/O error")),
        21 => Err(err("Invalid address")),
        23 => Err(err("Abort")),
        29 => Err(err("Channel already established")),
        _  => Err(err("Unknown VXI-11 device error")),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Link {
    pub link_id: i32,
    pub max_recv_size: u32,
}

// Splits a write into pieces of at most `max_recv_size` bytes; only the last one carries END
fn write_chunks(data:&[u8], max_recv_size:u32) -> Vec<(&[u8], i32)> {
    if data.is_empty() {
        return vec![(data, OPERATION_FLAGS_END_ONLY)];
    }
    let len = if max_recv_size == 0 { data.len() } else { max_recv_size as usize };
    let n = (data.len() + len - 1) / len;
    data.chunks(len)
        .enumerate()
        .map(|(i, chunk)| (chunk, if i + 1 == n { OPERATION_FLAGS_END_ONLY } else { 0 }))
        .collect()
}

/// Client for the VXI-11 core channel of one instrument.  Holds at most one link.
pub struct CoreClient {
    client: TcpClient,
    opt_link: Option<Link>,
    io_timeout_ms: u32,
}

impl CoreClient {

    fn get_link(&self) -> io::Result<Link> {
        self.opt_link.ok_or_else(|| Error::new(ErrorKind::NotConnected, "No VXI-11 link"))
    }

    pub fn new(host:&str) -> io::Result<Self> {
        // Find the port to use for the core program
        let mut pmap_client = TcpPortMapperClient::new(host)?;

        let mapping = Mapping {
            program: DEVICE_CORE_PROG,
            version: DEVICE_CORE_VERS,
            protocol: Protocol::TCP,
            port: 0,
        };

        let port = pmap_client.get_port(&mapping)?;
        log::debug!("vxi11: core channel of {} is on port {}", host, port);

        let client = TcpClient::connect((host, port), DEVICE_CORE_PROG, DEVICE_CORE_VERS)?;

        Ok(CoreClient{ client, opt_link: None, io_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS })
    }

    pub fn set_timeout(&mut self, timeout:Duration) -> io::Result<()> {
        self.io_timeout_ms = timeout.as_millis().min(u32::MAX as u128) as u32;
        // Give the instrument a chance to report its own timeout before the socket gives up
        self.client.set_timeout(Some(timeout + Duration::from_secs(1)))
    }

    pub fn create_link(&mut self, device:&str) -> io::Result<()> {
        if self.opt_link.is_some() {
            return Err(err("Already connected to a link"));
        }

        self.client.start_call(CREATE_LINK)?;
        xdr_pack::pack_create_link_parms(&mut self.client.packer, CLIENT_ID, false, DEFAULT_LOCK_TIMEOUT_MS, device)?;
        self.client.do_call()?;

        let error:i32         = self.client.unpacker.unpack_i32()?;
        let link_id:i32       = self.client.unpacker.unpack_i32()?;
        let _abort_port:u32   = self.client.unpacker.unpack_u32()?;
        let max_recv_size:u32 = self.client.unpacker.unpack_u32()?;

        device_error(error)?;

        log::debug!("vxi11: created link {} (max_recv_size={})", link_id, max_recv_size);
        self.opt_link = Some(Link{ link_id, max_recv_size });
        Ok(())
    }

    pub fn write(&mut self, data:&[u8]) -> io::Result<()> {
        let link = self.get_link()?;
        for (chunk, flags) in write_chunks(data, link.max_recv_size) {
            self.write_chunk(link.link_id, chunk, flags)?;
        }
        Ok(())
    }

    fn write_chunk(&mut self, link_id:i32, data:&[u8], flags:i32) -> io::Result<()> {
        self.client.start_call(DEVICE_WRITE)?;
        xdr_pack::pack_device_write_parms(&mut self.client.packer, link_id, self.io_timeout_ms, DEFAULT_LOCK_TIMEOUT_MS, flags, data)?;
        self.client.do_call()?;

        let error:i32 = self.client.unpacker.unpack_i32()?;
        let size:u32  = self.client.unpacker.unpack_u32()?;
        device_error(error)?;

        if size as usize != data.len() {
            return Err(err("Number of bytes in confirmation doesn't match number of bytes sent"));
        }
        Ok(())
    }

    /// Reads until the instrument flags END, gathering partial reads along the way.
    pub fn read(&mut self) -> io::Result<Vec<u8>> {
        let link_id:i32 = self.get_link()?.link_id;
        let mut ans:Vec<u8> = vec![];

        loop {
            self.client.start_call(DEVICE_READ)?;
            xdr_pack::pack_device_read_parms(&mut self.client.packer, link_id, u32::MAX, self.io_timeout_ms, DEFAULT_LOCK_TIMEOUT_MS, 0, 0)?;
            self.client.do_call()?;

            let error:i32    = self.client.unpacker.unpack_i32()?;
            let reason:i32   = self.client.unpacker.unpack_i32()?;
            let data:Vec<u8> = self.client.unpacker.unpack_variable_len_opaque()?;
            device_error(error)?;

            ans.extend_from_slice(&data);
            if reason & REASON_END != 0 {
                return Ok(ans);
            }
            if reason == 0 && data.is_empty() {
                return Err(err("Device read returned no data and no reason bits"));
            }
        }
    }

    pub fn destroy_link(&mut self) -> io::Result<()> {
        let link_id:i32 = self.get_link()?.link_id;
        self.opt_link = None;

        self.client.start_call(DESTROY_LINK)?;
        self.client.packer.pack_i32(link_id)?;
        self.client.do_call()?;

        device_error(self.client.unpacker.unpack_i32()?)
    }

}
