
use std::io::{self, Error, ErrorKind};

use crate::xdr::Unpacker;
use crate::rpc::{REPLY, MSG_DENIED, MSG_ACCEPTED, RPC_MISMATCH, AUTH_ERROR, SUCCESS, PROG_UNAVAIL, PROG_MISMATCH, PROC_UNAVAIL, GARBAGE_ARGS};

fn err(msg:&str) -> io::Error { Error::new(ErrorKind::Other, msg) }

fn skip_auth(unpacker:&mut Unpacker) -> io::Result<()> {
	unpacker.unpack_enum()?;
	unpacker.unpack_variable_len_opaque()?;
	Ok(())
}

/// Consumes an accepted, successful reply header and returns its xid.  Everything else is an error.
pub fn unpack_replyheader(unpacker:&mut Unpacker) -> io::Result<u32> {
	let xid:u32 = unpacker.unpack_u32()?;

	if unpacker.unpack_enum()? != REPLY { return Err(err("Expected a REPLY message")); }

	match unpacker.unpack_enum()? {
		MSG_ACCEPTED => { },
		MSG_DENIED => {
			return match unpacker.unpack_enum()? {
				RPC_MISMATCH => Err(err("RPC call denied: RPC version mismatch")),
				AUTH_ERROR   => Err(err("RPC call denied: authentication error")),
				_            => Err(err("RPC call denied for an unknown reason")),
			};
		},
		_ => return Err(err("Neither MSG_DENIED nor MSG_ACCEPTED in RPC reply")),
	}

	skip_auth(unpacker)?;

	match unpacker.unpack_enum()? {
		SUCCESS       => Ok(xid),
		PROG_UNAVAIL  => Err(err("RPC program unavailable")),
		PROG_MISMATCH => Err(err("RPC program version mismatch")),
		PROC_UNAVAIL  => Err(err("RPC procedure unavailable")),
		GARBAGE_ARGS  => Err(err("RPC server could not decode arguments")),
		_             => Err(err("RPC call failed for an unknown reason")),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::xdr::Packer;

	fn reply(xid:u32, accept_stat:i32) -> Vec<u8> {
		let mut p = Packer::new();
		p.pack_u32(xid).unwrap();
		p.pack_enum(REPLY).unwrap();
		p.pack_enum(MSG_ACCEPTED).unwrap();
		p.pack_enum(0).unwrap();
		p.pack_variable_len_opaque(&[]).unwrap();
		p.pack_enum(accept_stat).unwrap();
		p.pack_u32(1234).unwrap();
		p.as_bytes().to_vec()
	}

	#[test]
	fn accepted_reply_leaves_body_in_unpacker() {
		let mut u = Unpacker::new();
		u.reset(&reply(7, SUCCESS));
		assert_eq!(unpack_replyheader(&mut u).unwrap(), 7);
		assert_eq!(u.unpack_u32().unwrap(), 1234);
	}

	#[test]
	fn prog_unavail_is_reported() {
		let mut u = Unpacker::new();
		u.reset(&reply(7, PROG_UNAVAIL));
		let e = unpack_replyheader(&mut u).unwrap_err();
		assert!(e.to_string().contains("unavailable"));
	}
}
