
// Range checks for values typed into the menu.  The core never clamps or re-validates; these run before
// anything is handed to the controller.

use crate::error::{Error, Result};

pub const FREQ_MIN_HZ:f64 = 0.000001;
pub const FREQ_MAX_HZ:f64 = 20_000_000.0;
pub const AMP_MIN_VPP:f64 = 0.002;
pub const AMP_MAX_VPP:f64 = 10.0;
pub const CYCLES_MIN:u32 = 1;
pub const CYCLES_MAX:u32 = 50_000;

pub const CH2_DEFAULT_FREQ_HZ:f64 = 4800.0;
pub const CH2_DEFAULT_AMP_VPP:f64 = 5.0;

// Gaussian burst menu limits
pub const GAUSS_FREQ_MIN_MHZ:u32 = 1;
pub const GAUSS_FREQ_MAX_MHZ:u32 = 10;
pub const GAUSS_CYCLES_MAX:u32 = 5;
pub const GAUSS_AMP_MAX_V:u32 = 5;

fn invalid<T>(msg:String) -> Result<T> { Err(Error::InvalidParameter(msg)) }

fn parse_f64(input:&str, what:&str) -> Result<f64> {
	match input.trim().parse::<f64>() {
		Ok(x) if x.is_finite() => Ok(x),
		_ => invalid(format!("{} must be a number, got {:?}", what, input.trim())),
	}
}

fn parse_u32(input:&str, what:&str) -> Result<u32> {
	input.trim().parse::<u32>().or_else(|_| invalid(format!("{} must be a whole number, got {:?}", what, input.trim())))
}

fn in_range_f64(x:f64, lo:f64, hi:f64, what:&str, unit:&str) -> Result<f64> {
	if x < lo || x > hi { invalid(format!("{} must be between {} {} and {} {}", what, lo, unit, hi, unit)) }
	else { Ok(x) }
}

fn in_range_u32(x:u32, lo:u32, hi:u32, what:&str) -> Result<u32> {
	if x < lo || x > hi { invalid(format!("{} must be between {} and {}", what, lo, hi)) }
	else { Ok(x) }
}

/// Empty input yields `default` when there is one.
fn or_default<T, F:FnOnce(&str) -> Result<T>>(input:&str, default:Option<T>, parse:F) -> Result<T> {
	match default {
		Some(d) if input.trim().is_empty() => Ok(d),
		_ => parse(input),
	}
}

pub fn frequency_hz(input:&str, default:Option<f64>) -> Result<f64> {
	or_default(input, default, |s| in_range_f64(parse_f64(s, "frequency")?, FREQ_MIN_HZ, FREQ_MAX_HZ, "frequency", "Hz"))
}

pub fn amplitude_vpp(input:&str, default:Option<f64>) -> Result<f64> {
	or_default(input, default, |s| in_range_f64(parse_f64(s, "amplitude")?, AMP_MIN_VPP, AMP_MAX_VPP, "amplitude", "Vpp"))
}

pub fn offset_v(input:&str, default:Option<f64>) -> Result<f64> {
	or_default(input, default, |s| parse_f64(s, "offset"))
}

pub fn cycles(input:&str) -> Result<u32> {
	in_range_u32(parse_u32(input, "cycle count")?, CYCLES_MIN, CYCLES_MAX, "cycle count")
}

pub fn channel(input:&str) -> Result<u8> {
	match input.trim() {
		"1" => Ok(1),
		"2" => Ok(2),
		other => invalid(format!("channel must be 1 or 2, got {:?}", other)),
	}
}

pub fn gaussian_frequency_mhz(input:&str) -> Result<u32> {
	in_range_u32(parse_u32(input, "frequency")?, GAUSS_FREQ_MIN_MHZ, GAUSS_FREQ_MAX_MHZ, "frequency in MHz")
}

pub fn gaussian_cycles(input:&str) -> Result<u32> {
	in_range_u32(parse_u32(input, "cycle count")?, 1, GAUSS_CYCLES_MAX, "cycle count")
}

pub fn gaussian_amplitude_v(input:&str) -> Result<u32> {
	in_range_u32(parse_u32(input, "amplitude")?, 1, GAUSS_AMP_MAX_V, "amplitude in V")
}

pub fn yes_no(input:&str) -> Result<bool> {
	match input.trim().to_ascii_lowercase().as_str() {
		"y" | "yes" | "s" | "si" => Ok(true),
		"n" | "no" => Ok(false),
		other => invalid(format!("answer yes or no, got {:?}", other)),
	}
}
