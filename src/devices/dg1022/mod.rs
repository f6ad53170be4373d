
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Serialize, Deserialize};

use crate::error::{Error, Result};
use crate::link::SettleClass;
use crate::scpi::{self, BurstMode, TriggerSource, Command};
use crate::session::{Identity, Session};

pub mod arb;

lazy_static! {
	// SIN,1.000000e+03,5.000000e+00,-1.500000e+00  (some firmware wraps it as CH1:"...")
	static ref APPLY_RE: Regex = Regex::new("^(?:CH[12]:)?\"?([A-Z]+),\\s*([^,]+),\\s*([^,]+),\\s*([^,\"]+)\"?$").unwrap();
}

pub const CHANNELS:[u8; 2] = [1, 2];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Waveform {
	Sine,
	Square,
	Ramp,
	Pulse,
	Noise,
	User,
	DC,
}

impl Waveform {
	fn from_token(s:&str) -> Option<Self> {
		// The DG1022 answers with abbreviations (SIN, SQU, PULS, NOIS) but accept the long forms as well
		let s = s.to_ascii_uppercase();
		if      s.starts_with("SIN")  { Some(Waveform::Sine)   }
		else if s.starts_with("SQU")  { Some(Waveform::Square) }
		else if s.starts_with("RAMP") { Some(Waveform::Ramp)   }
		else if s.starts_with("PULS") { Some(Waveform::Pulse)  }
		else if s.starts_with("NOIS") { Some(Waveform::Noise)  }
		else if s.starts_with("USER") { Some(Waveform::User)   }
		else if s == "DC"             { Some(Waveform::DC)     }
		else                          { None                   }
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelState {
	pub waveform: Waveform,
	pub frequency_hz: f64,
	pub amplitude_vpp: f64,
	pub offset_v: f64,
	/// Only reported for channel 1, the only channel driven in burst mode.
	pub burst_enabled: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BurstState {
	pub mode: String,
	pub enabled: bool,
	pub cycles: u32,
}

pub fn chan_ok(n:u8) -> Result<()> {
	if CHANNELS.contains(&n) { Ok(()) }
	else { Err(Error::InvalidParameter(format!("DG1022 only has two channels, got {}", n))) }
}

fn parse_f64(query:&str, reply:&str, field:&str) -> Result<f64> {
	field.trim().parse::<f64>().map_err(|_| Error::malformed(query, reply))
}

/// Parses an `APPLy?` style reply: `kind,frequency,amplitude,offset`.
pub fn parse_apply(query:&str, reply:&str) -> Result<ChannelState> {
	let trimmed = reply.trim();
	let cap:Captures = APPLY_RE.captures(trimmed).ok_or_else(|| Error::malformed(query, reply))?;

	let waveform = Waveform::from_token(&cap[1]).ok_or_else(|| Error::malformed(query, reply))?;
	Ok(ChannelState{
		waveform,
		frequency_hz:  parse_f64(query, reply, &cap[2])?,
		amplitude_vpp: parse_f64(query, reply, &cap[3])?,
		offset_v:      parse_f64(query, reply, &cap[4])?,
		burst_enabled: None,
	})
}

pub fn parse_switch(query:&str, reply:&str) -> Result<bool> {
	match reply.trim().to_ascii_uppercase().as_str() {
		"ON"  | "1" => Ok(true),
		"OFF" | "0" => Ok(false),
		_ => Err(Error::malformed(query, reply)),
	}
}

pub fn parse_count(query:&str, reply:&str) -> Result<u32> {
	// Cycle counts come back either as plain integers or in the same e-notation as frequencies
	let x = parse_f64(query, reply, reply)?;
	if x >= 0.0 && x.fract() == 0.0 && x <= u32::MAX as f64 { Ok(x as u32) }
	else { Err(Error::malformed(query, reply)) }
}

/// Channel controller for a Rigol DG1022.  Holds nothing but the session it drives.
pub struct DG1022<'s> {
	session: &'s mut Session,
}

impl<'s> DG1022<'s> {

	pub fn new(session:&'s mut Session) -> Self { DG1022{ session } }

	pub fn session(&mut self) -> &mut Session { &mut *self.session }

	fn send(&mut self, cmd:Command) -> Result<()> { self.session.send_command(&cmd) }

	fn ask(&mut self, cmd:Command) -> Result<(String, String)> {
		let reply = self.session.send_query(&cmd)?;
		Ok((cmd.as_str().to_owned(), reply))
	}

	pub fn identify(&mut self) -> Result<Identity> {
		let (_, reply) = self.ask(scpi::identify())?;
		Identity::parse(&reply)
	}

	/// Continuous sine on one channel.  Values are forwarded as given; range checks belong to the caller.
	pub fn configure_sine(&mut self, chan_num:u8, freq_hz:f64, amp_vpp:f64, offset_v:f64) -> Result<()> {
		chan_ok(chan_num)?;
		self.send(scpi::apply_sine_on(chan_num, freq_hz, amp_vpp, offset_v))?;
		log::info!("dg1022: CH{} sine {} Hz, {} Vpp, offset {} V", chan_num, freq_hz, amp_vpp, offset_v);
		Ok(())
	}

	/// Triggered burst of `cycles` sine periods on channel 1.  The base waveform goes first, burst parameters
	/// only take effect once burst is on.  The first failing step ends the sequence.
	pub fn configure_burst(&mut self, freq_hz:f64, amp_vpp:f64, cycles:u32, offset_v:f64) -> Result<()> {
		let steps = vec![
			scpi::apply_sine_on(1, freq_hz, amp_vpp, offset_v).with_class(SettleClass::Burst),
			scpi::burst_state(true),
			scpi::burst_mode(BurstMode::Triggered),
			scpi::burst_cycles(cycles),
			scpi::burst_phase(0.0),
			scpi::trigger_source(TriggerSource::Immediate),
		];
		for cmd in steps {
			self.send(cmd)?;
		}
		log::info!("dg1022: CH1 burst {} Hz, {} Vpp, {} cycles", freq_hz, amp_vpp, cycles);
		Ok(())
	}

	pub fn read_channel_state(&mut self, chan_num:u8) -> Result<ChannelState> {
		chan_ok(chan_num)?;

		let (query, reply) = self.ask(scpi::apply_query_on(chan_num))?;
		let mut state = parse_apply(&query, &reply)?;

		if chan_num == 1 {
			let (query, reply) = self.ask(scpi::burst_state_query())?;
			state.burst_enabled = Some(parse_switch(&query, &reply)?);
		}
		Ok(state)
	}

	/// Output enable on the DG1022 is global even though configuration is per channel.
	pub fn set_output_enabled(&mut self, on:bool) -> Result<()> {
		self.send(scpi::output(on))?;
		log::info!("dg1022: output {}", if on { "on" } else { "off" });
		Ok(())
	}

	pub fn select_channel(&mut self, chan_num:u8) -> Result<()> {
		chan_ok(chan_num)?;
		self.send(scpi::select_channel(chan_num))
	}

	/// State of whichever channel `select_channel` made current.
	pub fn read_selected_state(&mut self) -> Result<ChannelState> {
		let (query, reply) = self.ask(scpi::apply_query())?;
		parse_apply(&query, &reply)
	}

	/// Sine on the currently selected channel.
	pub fn apply_sine(&mut self, freq_hz:f64, amp_vpp:f64, offset_v:f64) -> Result<()> {
		self.send(scpi::apply_sine(freq_hz, amp_vpp, offset_v))
	}

	pub fn set_burst(&mut self, enabled:bool, cycles:u32) -> Result<()> {
		self.send(scpi::burst_state(enabled))?;
		if enabled {
			self.send(scpi::burst_cycles(cycles))?;
		}
		Ok(())
	}

	pub fn read_burst_state(&mut self) -> Result<BurstState> {
		let (_, mode) = self.ask(scpi::burst_mode_query())?;
		let (query, reply) = self.ask(scpi::burst_state_query())?;
		let enabled = parse_switch(&query, &reply)?;
		let (query, reply) = self.ask(scpi::burst_cycles_query())?;
		let cycles = parse_count(&query, &reply)?;

		Ok(BurstState{ mode: mode.trim().to_owned(), enabled, cycles })
	}

}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_apply_reply() {
		let s = parse_apply("APPLy:CH2?", "SIN,1.000000e+03,5.000000e+00,-1.500000e+00\n").unwrap();
		assert_eq!(s, ChannelState{ waveform: Waveform::Sine, frequency_hz: 1000.0, amplitude_vpp: 5.0, offset_v: -1.5, burst_enabled: None });
	}

	#[test]
	fn parses_quoted_reply_with_channel_prefix() {
		let s = parse_apply("APPLy:CH1?", "CH1:\"USER,2.000000e+06,2.000000e+00,0.000000e+00\"").unwrap();
		assert_eq!(s.waveform, Waveform::User);
		assert_eq!(s.frequency_hz, 2.0e6);
	}

	#[test]
	fn short_reply_is_malformed() {
		match parse_apply("APPLy:CH2?", "SIN,1.000000e+03") {
			Err(Error::MalformedResponse{ query, response }) => {
				assert_eq!(query, "APPLy:CH2?");
				assert_eq!(response, "SIN,1.000000e+03");
			},
			other => panic!("expected MalformedResponse, got {:?}", other),
		}
	}

	#[test]
	fn unknown_waveform_and_bad_number_are_malformed() {
		assert!(parse_apply("APPLy?", "TRI,1,2,3").is_err());
		assert!(parse_apply("APPLy?", "SIN,fast,2,3").is_err());
	}

	#[test]
	fn switch_and_count_replies() {
		assert!(parse_switch("BURS:STAT?", "ON\n").unwrap());
		assert!(!parse_switch("BURS:STAT?", "0").unwrap());
		assert!(parse_switch("BURS:STAT?", "").is_err());
		assert_eq!(parse_count("BURS:NCYCles?", "3").unwrap(), 3);
		assert_eq!(parse_count("BURS:NCYCles?", "5.000000e+01").unwrap(), 50);
		assert!(parse_count("BURS:NCYCles?", "2.5").is_err());
	}

	#[test]
	fn only_two_channels() {
		assert!(chan_ok(1).is_ok());
		assert!(chan_ok(2).is_ok());
		assert!(matches!(chan_ok(3), Err(Error::InvalidParameter(_))));
	}
}
