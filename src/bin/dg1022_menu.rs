
use std::io::{self, BufRead, Write};
use std::time::Duration;

use clap::Parser;

use dg1022::devices::dg1022::{ChannelState, DG1022};
use dg1022::devices::dg1022::arb::GaussianBurst;
use dg1022::link::{LinkProvider, MockBench, SettleProfile, Vxi11Provider};
use dg1022::session::{DEFAULT_RECONNECT_DELAY_MS, DEFAULT_TIMEOUT_MS};
use dg1022::{validate, Discovery, Session, SessionConfig};

const SIM_ADDRESS:&str = "SIM0::DG1D200000001::INSTR";

/// Text menu for a Rigol DG1022 function generator
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
	/// VXI-11 host or VISA address to try (repeatable); without any, instruments are found by broadcast
	#[arg(long = "host")]
	hosts: Vec<String>,

	/// Accept the first address containing this token instead of matching *IDN?. VXI-11 addresses
	/// look like TCPIP0::<ip>::inst0::INSTR and carry no serial number, so over LAN the token has to
	/// be part of the host or IP
	#[arg(long)]
	address_token: Option<String>,

	/// Vendor substring required in *IDN?
	#[arg(long, default_value = "RIGOL")]
	vendor: String,

	/// Model substring required in *IDN?
	#[arg(long, default_value = "DG1022")]
	model: String,

	#[arg(long, default_value_t = DEFAULT_TIMEOUT_MS)]
	timeout_ms: u64,

	#[arg(long, default_value_t = DEFAULT_RECONNECT_DELAY_MS)]
	reconnect_delay_ms: u64,

	/// Skip the firmware settle pauses
	#[arg(long)]
	no_settle: bool,

	/// Drive a simulated generator instead of real hardware
	#[arg(long)]
	simulate: bool,
}

fn simulated_bench() -> MockBench {
	let bench = MockBench::new();
	bench.add_instrument(SIM_ADDRESS, "RIGOL TECHNOLOGIES,DG1022 ,DG1D200000001,00.03.00.09.00.02.11");
	bench.respond(SIM_ADDRESS, "APPLy:CH1?", "SIN,1.000000e+03,5.000000e+00,0.000000e+00");
	bench.respond(SIM_ADDRESS, "APPLy:CH2?", "SIN,4.800000e+03,5.000000e+00,0.000000e+00");
	bench.respond(SIM_ADDRESS, "APPLy?", "SIN,1.000000e+03,5.000000e+00,0.000000e+00");
	bench.respond(SIM_ADDRESS, "BURS:STAT?", "ON");
	bench.respond(SIM_ADDRESS, "BURS:MODE?", "TRIG");
	bench.respond(SIM_ADDRESS, "BURS:NCYCles?", "1");
	bench
}

fn display_menu() {
	println!("====== DG1022 ======");
	println!(" 1. Connect");
	println!(" 2. Output on");
	println!(" 3. Configure CH1 burst (frequency, cycles, amplitude)");
	println!(" 4. Show CH1 state");
	println!(" 5. Configure CH2 sine (frequency, amplitude, offset)");
	println!(" 6. Show CH2 state");
	println!(" 7. Burst on/off");
	println!(" 8. Show burst state");
	println!(" 9. Gaussian burst (arbitrary waveform)");
	println!("10. Output off");
	println!("11. Disconnect");
	println!("12. Select channel and show its state");
	println!("13. Sine on the selected channel (frequency, amplitude, offset)");
	println!(" 0. Exit");
	println!("====================");
}

struct Prompt<R: BufRead> {
	input: R,
}

impl<R: BufRead> Prompt<R> {

	fn line(&mut self, prompt:&str) -> io::Result<String> {
		print!("{}", prompt);
		io::stdout().flush()?;
		let mut s = String::new();
		if self.input.read_line(&mut s)? == 0 {
			return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "end of input"));
		}
		Ok(s)
	}

	// Asks again until `parse` accepts the answer
	fn ask<T, F:Fn(&str) -> dg1022::Result<T>>(&mut self, prompt:&str, parse:F) -> io::Result<T> {
		loop {
			let s = self.line(prompt)?;
			match parse(&s) {
				Ok(x) => return Ok(x),
				Err(e) => println!("{}", e),
			}
		}
	}

}

fn print_state(label:&str, state:&ChannelState) {
	println!("{}: {}", label, serde_json::to_string_pretty(state).unwrap_or_else(|_| format!("{:?}", state)));
}

fn show_state(dev:&mut DG1022, chan_num:u8) -> dg1022::Result<()> {
	let state = dev.read_channel_state(chan_num)?;
	print_state(&format!("CH{}", chan_num), &state);
	Ok(())
}

fn show_selected(dev:&mut DG1022, chan_num:u8) -> dg1022::Result<()> {
	dev.select_channel(chan_num)?;
	let state = dev.read_selected_state()?;
	print_state(&format!("CH{} (selected)", chan_num), &state);
	Ok(())
}

fn run<R: BufRead>(session:&mut Session, discovery:&Discovery, prompt:&mut Prompt<R>) -> io::Result<()> {
	loop {
		display_menu();
		let choice = prompt.line("Select an option: ")?;

		let result:dg1022::Result<()> = match choice.trim() {
			"1" => session.discover_and_connect(discovery).map(|id| println!("Connected: {} {} ({})", id.manufacturer, id.model, id.serial_num)),
			"2" => DG1022::new(session).set_output_enabled(true),
			"3" => {
				let freq = prompt.ask("Frequency in Hz (0.000001 to 20000000): ", |s| validate::frequency_hz(s, None))?;
				let cycles = prompt.ask("Cycles (1 to 50000): ", validate::cycles)?;
				let amp = prompt.ask("Amplitude in Vpp (0.002 to 10): ", |s| validate::amplitude_vpp(s, None))?;
				DG1022::new(session).configure_burst(freq, amp, cycles, 0.0)
			},
			"4" => show_state(&mut DG1022::new(session), 1),
			"5" => {
				let freq = prompt.ask("Frequency in Hz, empty for 4800: ", |s| validate::frequency_hz(s, Some(validate::CH2_DEFAULT_FREQ_HZ)))?;
				let amp = prompt.ask("Amplitude in Vpp, empty for 5: ", |s| validate::amplitude_vpp(s, Some(validate::CH2_DEFAULT_AMP_VPP)))?;
				let offset = prompt.ask("Offset in V, empty for 0: ", |s| validate::offset_v(s, Some(0.0)))?;
				DG1022::new(session).configure_sine(2, freq, amp, offset)
			},
			"6" => show_state(&mut DG1022::new(session), 2),
			"7" => {
				let enable = prompt.ask("Enable burst mode? (yes/no): ", validate::yes_no)?;
				let cycles = if enable { prompt.ask("Cycles (1 to 50000): ", validate::cycles)? } else { 0 };
				DG1022::new(session).set_burst(enable, cycles)
			},
			"8" => DG1022::new(session).read_burst_state().map(|b| println!("Burst: mode {}, {}, {} cycle(s)", b.mode, if b.enabled { "on" } else { "off" }, b.cycles)),
			"9" => {
				let mhz = prompt.ask("Frequency in MHz (1 to 10): ", validate::gaussian_frequency_mhz)?;
				let cycles = prompt.ask("Cycles (1 to 5): ", validate::gaussian_cycles)?;
				let amp = prompt.ask("Amplitude in V (1 to 5): ", validate::gaussian_amplitude_v)?;
				GaussianBurst::new(mhz as f64 * 1e6, cycles, amp as f64)
					.and_then(|burst| DG1022::new(session).run_gaussian_burst(&burst))
			},
			"10" => DG1022::new(session).set_output_enabled(false),
			"11" => {
				session.disconnect();
				Ok(())
			},
			"12" => {
				let chan_num = prompt.ask("Channel (1 or 2): ", validate::channel)?;
				show_selected(&mut DG1022::new(session), chan_num)
			},
			"13" => {
				let freq = prompt.ask("Frequency in Hz (0.000001 to 20000000): ", |s| validate::frequency_hz(s, None))?;
				let amp = prompt.ask("Amplitude in Vpp (0.002 to 10): ", |s| validate::amplitude_vpp(s, None))?;
				let offset = prompt.ask("Offset in V, empty for 0: ", |s| validate::offset_v(s, Some(0.0)))?;
				DG1022::new(session).apply_sine(freq, amp, offset)
			},
			"0" => {
				if session.is_connected() {
					if let Err(e) = DG1022::new(session).set_output_enabled(false) {
						println!("Error: {}", e);
					}
				}
				session.close();
				println!("Bye.");
				return Ok(());
			},
			other => {
				println!("Unknown option {:?}", other);
				Ok(())
			},
		};

		if let Err(e) = result {
			println!("Error: {}", e);
		}
	}
}

fn main() -> io::Result<()> {
	env_logger::Builder::from_default_env()
		.filter_level(log::LevelFilter::Info)
		.parse_default_env()
		.init();

	let args = Args::parse();

	let provider:Box<dyn LinkProvider> = if args.simulate {
		Box::new(simulated_bench())
	} else if args.hosts.is_empty() {
		Box::new(Vxi11Provider::new())
	} else {
		Box::new(Vxi11Provider::with_hosts(&args.hosts))
	};

	let config = SessionConfig {
		timeout: Duration::from_millis(args.timeout_ms),
		reconnect_delay: Duration::from_millis(args.reconnect_delay_ms),
		settle: if args.no_settle { SettleProfile::none() } else { SettleProfile::default() },
	};

	let discovery = match &args.address_token {
		Some(token) => Discovery::address_token(token),
		None => Discovery::identity(&args.vendor, &args.model),
	};

	let mut session = Session::new(provider, config);
	match session.discover_and_connect(&discovery) {
		Ok(id) => println!("Connected: {} {} ({})", id.manufacturer, id.model, id.serial_num),
		Err(e) => println!("Not connected: {}", e),
	}

	let stdin = io::stdin();
	let mut prompt = Prompt{ input: stdin.lock() };
	match run(&mut session, &discovery, &mut prompt) {
		Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
			session.close();
			Ok(())
		},
		other => other,
	}
}
