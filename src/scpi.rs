
// SCPI commands understood by the DG1022.  Each builder returns the exact text sent on the wire together
// with the settle class the link has to honor after it.

use std::fmt;

use crate::link::SettleClass;

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
	text: String,
	class: SettleClass,
}

impl Command {

	pub fn new<S: Into<String>>(text:S) -> Self { Command{ text: text.into(), class: SettleClass::Generic } }

	pub fn with_class(mut self, class:SettleClass) -> Self {
		self.class = class;
		self
	}

	pub fn as_str(&self) -> &str { &self.text }
	pub fn class(&self) -> SettleClass { self.class }

}

impl fmt::Display for Command {

	fn fmt(&self, f:&mut fmt::Formatter) -> fmt::Result {
		// Waveform data blocks run to hundreds of characters, which is useless in a log line
		const MAX:usize = 64;
		match self.text.char_indices().nth(MAX) {
			Some((cut, _)) => write!(f, "{}... ({} bytes)", &self.text[..cut], self.text.len()),
			None => f.write_str(&self.text),
		}
	}

}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurstMode { Triggered, Gated, Infinity }

impl BurstMode {
	pub fn token(self) -> &'static str {
		match self {
			BurstMode::Triggered => "TRIG",
			BurstMode::Gated     => "GAT",
			BurstMode::Infinity  => "INF",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource { Immediate, External, Bus }

impl TriggerSource {
	pub fn token(self) -> &'static str {
		match self {
			TriggerSource::Immediate => "IMM",
			TriggerSource::External  => "EXT",
			TriggerSource::Bus       => "BUS",
		}
	}
}

fn on_off(on:bool) -> &'static str { if on { "ON" } else { "OFF" } }

// System
pub fn identify() -> Command { Command::new("*IDN?") }
pub fn output(on:bool) -> Command { Command::new(format!("OUTP {}", on_off(on))).with_class(SettleClass::Output) }
pub fn select_channel(ch:u8) -> Command { Command::new(format!("INSTrument:SELect CHANnel{}", ch)) }

// Basic waveform
pub fn apply_sine_on(ch:u8, freq_hz:f64, amp_vpp:f64, offset_v:f64) -> Command {
	Command::new(format!("APPL:SIN:CH{} {},{},{}", ch, freq_hz, amp_vpp, offset_v))
}
pub fn apply_sine(freq_hz:f64, amp_vpp:f64, offset_v:f64) -> Command {
	Command::new(format!("APPLy:SINusoid {},{},{}", freq_hz, amp_vpp, offset_v))
}
pub fn apply_query_on(ch:u8) -> Command { Command::new(format!("APPLy:CH{}?", ch)) }
pub fn apply_query() -> Command { Command::new("APPLy?") }
pub fn frequency(freq_hz:f64) -> Command { Command::new(format!("FREQ {}", freq_hz)).with_class(SettleClass::Frequency) }

// Burst
pub fn burst_state(on:bool) -> Command { Command::new(format!("BURS:STAT {}", on_off(on))).with_class(SettleClass::Burst) }
pub fn burst_state_query() -> Command { Command::new("BURS:STAT?") }
pub fn burst_mode(mode:BurstMode) -> Command { Command::new(format!("BURS:MODE {}", mode.token())).with_class(SettleClass::Burst) }
pub fn burst_mode_query() -> Command { Command::new("BURS:MODE?") }
pub fn burst_cycles(n:u32) -> Command { Command::new(format!("BURS:NCYC {}", n)).with_class(SettleClass::Burst) }
pub fn burst_cycles_query() -> Command { Command::new("BURS:NCYCles?") }
pub fn burst_phase(deg:f64) -> Command { Command::new(format!("BURS:PHAS {}", deg)).with_class(SettleClass::Burst) }
pub fn burst_internal_period(period_s:f64) -> Command { Command::new(format!("BURS:INT:PER {}", period_s)).with_class(SettleClass::Burst) }
pub fn trigger_source(src:TriggerSource) -> Command { Command::new(format!("TRIG:SOUR {}", src.token())).with_class(SettleClass::Burst) }

// Arbitrary waveform
pub fn voltage_unit_vpp() -> Command { Command::new("VOLT:UNIT VPP") }
pub fn voltage_high(v:f64) -> Command { Command::new(format!("VOLT:HIGH {}", v)) }
pub fn voltage_low(v:f64) -> Command { Command::new(format!("VOLTage:LOW {}", v)) }
pub fn data_delete() -> Command { Command::new("DATA:DEL") }
pub fn data_dac_volatile(points:&[u16]) -> Command {
	let csv:Vec<String> = points.iter().map(|p| p.to_string()).collect();
	Command::new(format!("DATA:DAC VOLATILE,{}", csv.join(","))).with_class(SettleClass::Upload)
}
pub fn function_user_volatile() -> Command { Command::new("FUNC:USER VOLATILE") }
pub fn function_user() -> Command { Command::new("FUNC USER") }
