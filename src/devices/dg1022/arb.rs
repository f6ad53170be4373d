
// Arbitrary waveforms in the DG1022 volatile slot.  Samples are rescaled into the 14-bit DAC range and sent
// as one comma-separated block; the slot is lost on power cycle and never read back.

use std::f64::consts::PI;

use crate::error::{Error, Result};
use crate::scpi;
use super::DG1022;

pub const DAC_MIN:u16 = 0;
pub const DAC_MAX:u16 = 16383;

pub const GAUSSIAN_POINTS:usize = 100;

// Fixed parts of the gaussian burst program
pub const GAUSSIAN_BURST_PERIOD_S:f64 = 0.01;
pub const REFERENCE_FREQ_HZ:f64 = 4800.0;
pub const REFERENCE_AMP_VPP:f64 = 1.0;

/// Min-max rescale of `samples` into `[low, high]`.  The minimum lands on `low` and the maximum on `high`
/// exactly; intermediate values are truncated toward `low`.
pub fn quantize(samples:&[f64], low:u16, high:u16) -> Result<Vec<u16>> {
	if low >= high || high > DAC_MAX {
		return Err(Error::InvalidParameter(format!("DAC range [{}, {}] is not inside [{}, {}]", low, high, DAC_MIN, DAC_MAX)));
	}
	if let Some(idx) = samples.iter().position(|x| !x.is_finite()) {
		return Err(Error::InvalidParameter(format!("sample {} is not a finite number", idx)));
	}

	let cur_low  = samples.iter().cloned().fold(f64::INFINITY, f64::min);
	let cur_high = samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
	if samples.is_empty() || cur_high == cur_low {
		return Err(Error::DegenerateSignal{ len: samples.len() });
	}

	// Samples near +/- f64::MAX overflow the span; halving keeps it finite without losing the extremes
	let scale = if (cur_high - cur_low).is_finite() { 1.0 } else { 0.5 };
	let span  = cur_high * scale - cur_low * scale;
	let steps = (high - low) as f64;
	Ok(samples.iter()
		.map(|x| {
			let frac = (x * scale - cur_low * scale) / span;
			low + (steps * frac).min(steps) as u16
		})
		.collect())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArbitraryWaveform {
	pub samples: Vec<f64>,
	pub points: Vec<u16>,
	pub voltage_high: f64,
	pub voltage_low: f64,
}

impl ArbitraryWaveform {

	pub fn from_samples(samples:Vec<f64>, voltage_high:f64, voltage_low:f64) -> Result<Self> {
		Self::with_range(samples, DAC_MIN, DAC_MAX, voltage_high, voltage_low)
	}

	pub fn with_range(samples:Vec<f64>, low:u16, high:u16, voltage_high:f64, voltage_low:f64) -> Result<Self> {
		let points = quantize(&samples, low, high)?;
		Ok(ArbitraryWaveform{ samples, points, voltage_high, voltage_low })
	}

}

/// Gaussian-enveloped sine: `exp(-((t-0.5)/0.5)^2) * sin(cycles*2*pi*t)` over `n` points with t in [0, 1].
pub fn gaussian_samples(cycles:u32, n:usize) -> Vec<f64> {
	let last = (n.max(2) - 1) as f64;
	(0..n)
		.map(|i| {
			let t = i as f64 / last;
			(-((t - 0.5) / 0.5).powi(2)).exp() * (cycles as f64 * 2.0 * PI * t).sin()
		})
		.collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct GaussianBurst {
	pub waveform: ArbitraryWaveform,
	pub frequency_hz: f64,
	pub cycles: u32,
}

impl GaussianBurst {

	/// `cycles` carrier periods under one envelope, levels at +/- `amplitude_v`.
	pub fn new(frequency_hz:f64, cycles:u32, amplitude_v:f64) -> Result<Self> {
		if cycles == 0 {
			return Err(Error::InvalidParameter("a gaussian burst needs at least one cycle".into()));
		}
		let waveform = ArbitraryWaveform::from_samples(gaussian_samples(cycles, GAUSSIAN_POINTS), amplitude_v, -amplitude_v)?;
		Ok(GaussianBurst{ waveform, frequency_hz, cycles })
	}

	/// The waveform already holds `cycles` carrier periods, so the device repeats it at `frequency_hz / cycles`.
	pub fn burst_frequency_hz(&self) -> f64 { self.frequency_hz / self.cycles as f64 }

}

impl<'s> DG1022<'s> {

	/// Replaces the volatile waveform.  Output stays on whatever function it was.
	pub fn upload(&mut self, wf:&ArbitraryWaveform) -> Result<()> {
		self.send(scpi::voltage_unit_vpp())?;
		self.send(scpi::voltage_high(wf.voltage_high))?;
		self.send(scpi::voltage_low(wf.voltage_low))?;
		self.send(scpi::data_delete())?;
		self.send(scpi::data_dac_volatile(&wf.points))?;
		log::info!("dg1022: uploaded {} points to volatile memory ({} V to {} V)", wf.points.len(), wf.voltage_low, wf.voltage_high);
		Ok(())
	}

	/// Makes the volatile waveform the active user function and switches the output on.
	pub fn activate(&mut self) -> Result<()> {
		self.send(scpi::function_user_volatile())?;
		self.send(scpi::output(true))
	}

	pub fn send_gaussian_burst(&mut self, burst:&GaussianBurst) -> Result<()> {
		self.upload(&burst.waveform)?;
		self.send(scpi::frequency(burst.burst_frequency_hz()))
	}

	/// Full gaussian burst program: waveform, single-shot triggered burst on channel 1, and a reference sine
	/// on channel 2.
	pub fn run_gaussian_burst(&mut self, burst:&GaussianBurst) -> Result<()> {
		self.send_gaussian_burst(burst)?;
		self.send(scpi::function_user())?;
		self.send(scpi::trigger_source(scpi::TriggerSource::Immediate))?;
		self.send(scpi::burst_mode(scpi::BurstMode::Triggered))?;
		self.activate()?;
		self.send(scpi::burst_state(true))?;
		self.send(scpi::burst_internal_period(GAUSSIAN_BURST_PERIOD_S))?;
		self.send(scpi::burst_cycles(1))?;
		self.configure_sine(2, REFERENCE_FREQ_HZ, REFERENCE_AMP_VPP, 0.0)
	}

}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn extremes_map_exactly() {
		let samples = vec![0.3, -2.0, 7.5, 1.0, 7.5, -2.0];
		let q = quantize(&samples, DAC_MIN, DAC_MAX).unwrap();
		assert_eq!(q.len(), samples.len());
		assert_eq!(q[1], 0);
		assert_eq!(q[2], 16383);
		assert_eq!(q[4], 16383);
		assert!(q.iter().all(|p| *p <= DAC_MAX));
	}

	#[test]
	fn extremes_survive_an_overflowing_span() {
		let q = quantize(&[-f64::MAX, 0.0, f64::MAX], DAC_MIN, DAC_MAX).unwrap();
		assert_eq!(q[0], 0);
		assert_eq!(q[1], 8191);
		assert_eq!(q[2], 16383);

		let q = quantize(&[f64::MAX, -f64::MAX / 2.0, -f64::MAX], 100, 200).unwrap();
		assert_eq!(q[0], 200);
		assert_eq!(q[2], 100);
		assert!(q[1] > 100 && q[1] < 200);
	}

	#[test]
	fn custom_range_is_respected() {
		let q = quantize(&[1.0, 2.0, 3.0], 100, 200).unwrap();
		assert_eq!(q, vec![100, 150, 200]);
	}

	#[test]
	fn constant_signal_is_degenerate() {
		match quantize(&[0.25; 8], DAC_MIN, DAC_MAX) {
			Err(Error::DegenerateSignal{ len }) => assert_eq!(len, 8),
			other => panic!("expected DegenerateSignal, got {:?}", other),
		}
		assert!(matches!(quantize(&[], DAC_MIN, DAC_MAX), Err(Error::DegenerateSignal{ len: 0 })));
	}

	#[test]
	fn nan_and_bad_range_are_rejected() {
		assert!(matches!(quantize(&[0.0, f64::NAN, 1.0], DAC_MIN, DAC_MAX), Err(Error::InvalidParameter(_))));
		assert!(matches!(quantize(&[0.0, 1.0], 10, 10), Err(Error::InvalidParameter(_))));
		assert!(matches!(quantize(&[0.0, 1.0], 0, 20000), Err(Error::InvalidParameter(_))));
	}

	#[test]
	fn gaussian_burst_shape() {
		let b = GaussianBurst::new(5_000_000.0, 3, 2.0).unwrap();
		assert_eq!(b.waveform.samples.len(), GAUSSIAN_POINTS);
		assert_eq!(b.waveform.points.len(), GAUSSIAN_POINTS);
		assert_eq!(b.waveform.voltage_high, 2.0);
		assert_eq!(b.waveform.voltage_low, -2.0);
		assert_eq!(b.burst_frequency_hz(), 5_000_000.0 / 3.0);

		// Envelope is 1 at the centre and exp(-1) at both ends; the carrier is zero at t = 0
		assert!(b.waveform.samples[0].abs() < 1e-12);
		assert!(b.waveform.samples.iter().all(|x| x.abs() <= 1.0));
	}

	#[test]
	fn zero_cycles_is_rejected() {
		assert!(matches!(GaussianBurst::new(1e6, 0, 1.0), Err(Error::InvalidParameter(_))));
	}
}
