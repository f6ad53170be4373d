use dg1022::devices::dg1022::arb::{ArbitraryWaveform, GaussianBurst};
use dg1022::devices::dg1022::{ChannelState, Waveform, DG1022};
use dg1022::link::{MockBench, SettleProfile};
use dg1022::session::DEFAULT_TIMEOUT_MS;
use dg1022::{Discovery, Error, Session, SessionConfig};

use std::time::{Duration, Instant};

const DG: &str = "USB0::0x1AB1::0x0588::DG1D200000001::INSTR";
const DG_IDN: &str = "RIGOL TECHNOLOGIES,DG1022 ,DG1D200000001,00.03.00.09.00.02.11";

fn bench_with_generator() -> MockBench {
    let bench = MockBench::new();
    bench.add_instrument(DG, DG_IDN);
    bench
}

fn session_on(bench: &MockBench) -> Session {
    Session::new(Box::new(bench.clone()), SessionConfig::immediate())
}

fn connected(bench: &MockBench) -> Session {
    let mut session = session_on(bench);
    session.discover_and_connect(&Discovery::rigol_dg1022()).unwrap();
    bench.clear_written();
    session
}

#[test]
fn lifecycle_of_is_connected() {
    let bench = bench_with_generator();
    let mut session = session_on(&bench);
    assert!(!session.is_connected());

    let id = session.discover_and_connect(&Discovery::rigol_dg1022()).unwrap();
    assert!(session.is_connected());
    assert_eq!(id.manufacturer, "RIGOL TECHNOLOGIES");
    assert_eq!(id.model, "DG1022");
    assert_eq!(session.address(), Some(DG));

    session.disconnect();
    assert!(!session.is_connected());
    assert!(session.identity().is_none());
}

#[test]
fn connect_applies_the_default_timeout() {
    let bench = bench_with_generator();
    let mut session = session_on(&bench);
    session.discover_and_connect(&Discovery::rigol_dg1022()).unwrap();
    assert_eq!(bench.timeouts(), vec![Duration::from_millis(DEFAULT_TIMEOUT_MS)]);
}

#[test]
fn disconnect_switches_output_off_and_closes() {
    let bench = bench_with_generator();
    let mut session = connected(&bench);

    session.disconnect();
    assert_eq!(bench.written(DG), vec!["OUTP OFF"]);
    assert_eq!(bench.close_calls(), 1);

    // Second disconnect is a no-op
    session.disconnect();
    assert_eq!(bench.written(DG), vec!["OUTP OFF"]);
    assert_eq!(bench.close_calls(), 1);
}

#[test]
fn commands_fail_closed_when_disconnected() {
    let bench = bench_with_generator();
    let mut session = session_on(&bench);

    let mut dev = DG1022::new(&mut session);
    assert!(matches!(dev.configure_sine(2, 1000.0, 5.0, 0.0), Err(Error::NotConnected)));
    assert!(matches!(dev.read_channel_state(1), Err(Error::NotConnected)));
    assert!(matches!(dev.set_output_enabled(true), Err(Error::NotConnected)));
    assert_eq!(bench.open_calls(), 0);
    assert!(bench.written(DG).is_empty());
}

#[test]
fn discovery_with_no_match_is_not_found() {
    let bench = MockBench::new();
    bench.add_instrument("USB0::0x1AB1::0x04CE::DS1ZA000001::INSTR", "RIGOL TECHNOLOGIES,DS1054Z,DS1ZA000001,00.04.04");
    bench.add_instrument("ASRL1::INSTR", "SIGLENT,SDG2042X,SDG2XCA0000001,2.01.01.35R3");
    let mut session = session_on(&bench);

    assert!(matches!(session.discover_and_connect(&Discovery::rigol_dg1022()), Err(Error::NotFound)));
    assert!(!session.is_connected());
    // Non-matching candidates were closed again
    assert_eq!(bench.close_calls(), 2);
}

#[test]
fn discovery_with_empty_enumeration_is_not_found() {
    let bench = MockBench::new();
    let mut session = session_on(&bench);
    assert!(matches!(session.discover_and_connect(&Discovery::rigol_dg1022()), Err(Error::NotFound)));
    assert!(!session.is_connected());
}

#[test]
fn failed_enumeration_is_a_comm_error() {
    let bench = bench_with_generator();
    bench.fail_listing(true);
    let mut session = session_on(&bench);
    assert!(matches!(session.discover_and_connect(&Discovery::rigol_dg1022()), Err(Error::Comm(_))));
    assert!(!session.is_connected());
}

#[test]
fn discovery_picks_the_third_entry() {
    let bench = MockBench::new();
    bench.add_instrument("USB0::0x1AB1::0x04CE::DS1ZA000001::INSTR", "RIGOL TECHNOLOGIES,DS1054Z,DS1ZA000001,00.04.04");
    bench.add_instrument("ASRL1::INSTR", "SIGLENT,SDG2042X,SDG2XCA0000001,2.01.01.35R3");
    bench.add_instrument(DG, DG_IDN);
    let mut session = session_on(&bench);

    let id = session.discover_and_connect(&Discovery::rigol_dg1022()).unwrap();
    assert_eq!(id.serial_num, "DG1D200000001");
    assert_eq!(session.address(), Some(DG));
}

#[test]
fn failed_probe_does_not_stop_the_search() {
    let bench = MockBench::new();
    bench.add_instrument("USB0::0x1AB1::0x0588::DG1D100000009::INSTR", DG_IDN);
    bench.set_online("USB0::0x1AB1::0x0588::DG1D100000009::INSTR", false);
    bench.add_silent_instrument("USB0::0x1AB1::0x0588::DG1D100000010::INSTR");
    bench.add_instrument(DG, DG_IDN);
    let mut session = session_on(&bench);

    session.discover_and_connect(&Discovery::rigol_dg1022()).unwrap();
    assert_eq!(session.address(), Some(DG));
}

#[test]
fn only_failed_probes_give_a_comm_error() {
    let bench = MockBench::new();
    bench.add_silent_instrument(DG);
    let mut session = session_on(&bench);

    assert!(matches!(session.discover_and_connect(&Discovery::rigol_dg1022()), Err(Error::Comm(_))));
    assert!(!session.is_connected());
}

#[test]
fn address_token_strategy_matches_the_resource_string() {
    let bench = MockBench::new();
    bench.add_instrument("USB0::0x0957::0x0407::MY44000001::INSTR", "Agilent Technologies,33220A,MY44000001,2.02");
    bench.add_instrument(DG, DG_IDN);
    let mut session = session_on(&bench);

    let id = session.discover_and_connect(&Discovery::address_token("DG1D200")).unwrap();
    assert_eq!(id.model, "DG1022");
    // Only the matching address was opened
    assert_eq!(bench.open_calls(), 1);
    assert!(bench.written("USB0::0x0957::0x0407::MY44000001::INSTR").is_empty());
}

#[test]
fn identity_match_honors_the_address_filter() {
    let bench = MockBench::new();
    bench.add_instrument("TCPIP0::192.168.2.3::inst0::INSTR", DG_IDN);
    bench.add_instrument(DG, DG_IDN);
    let mut session = session_on(&bench);

    session.discover_and_connect(&Discovery::rigol_dg1022().with_address_filter("USB")).unwrap();
    assert_eq!(session.address(), Some(DG));
}

#[test]
fn fault_triggers_exactly_one_reconnect_that_succeeds() {
    let bench = bench_with_generator();
    let mut session = connected(&bench);
    let lists_before = bench.list_calls();

    bench.fail_on("APPL:SIN:CH2", 1);
    let result = DG1022::new(&mut session).configure_sine(2, 1000.0, 5.0, 0.0);

    assert!(matches!(result, Err(Error::Recovered(_))));
    assert!(session.is_connected());
    assert_eq!(bench.list_calls(), lists_before + 1);
    // The failed command is not replayed after reconnecting
    assert_eq!(bench.written(DG), vec!["*IDN?"]);
}

#[test]
fn fault_with_device_gone_leaves_session_disconnected() {
    let bench = bench_with_generator();
    let mut session = connected(&bench);
    let lists_before = bench.list_calls();

    bench.set_online(DG, false);
    let result = DG1022::new(&mut session).set_output_enabled(true);

    match result {
        Err(Error::ReconnectFailed(reason)) => assert!(matches!(*reason, Error::Comm(_))),
        other => panic!("expected ReconnectFailed, got {:?}", other),
    }
    assert!(!session.is_connected());
    assert_eq!(bench.list_calls(), lists_before + 1);

    // No automatic retries afterwards: the next command fails closed
    assert!(matches!(DG1022::new(&mut session).set_output_enabled(true), Err(Error::NotConnected)));
    assert_eq!(bench.list_calls(), lists_before + 1);
}

#[test]
fn explicit_reconnect_to_an_offline_device_fails() {
    let bench = bench_with_generator();
    let mut session = connected(&bench);

    bench.set_online(DG, false);
    let e = session.handle_disconnection().unwrap_err();
    assert!(matches!(e, Error::ReconnectFailed(_)));
    assert!(!session.is_connected());

    bench.set_online(DG, true);
    assert!(session.handle_disconnection().is_ok());
    assert!(session.is_connected());
}

#[test]
fn handle_disconnection_without_history_fails() {
    let bench = bench_with_generator();
    let mut session = session_on(&bench);
    assert!(matches!(session.handle_disconnection(), Err(Error::ReconnectFailed(_))));
    assert_eq!(bench.list_calls(), 0);
}

#[test]
fn close_forgets_the_discovery_strategy() {
    let bench = bench_with_generator();
    let mut session = connected(&bench);
    session.close();
    assert!(!session.is_connected());
    assert!(matches!(session.handle_disconnection(), Err(Error::ReconnectFailed(_))));
}

#[test]
fn burst_steps_go_out_in_order() {
    let bench = bench_with_generator();
    let mut session = connected(&bench);

    DG1022::new(&mut session).configure_burst(20_000_000.0, 0.002, 50_000, 0.0).unwrap();
    assert_eq!(
        bench.written(DG),
        vec![
            "APPL:SIN:CH1 20000000,0.002,0",
            "BURS:STAT ON",
            "BURS:MODE TRIG",
            "BURS:NCYC 50000",
            "BURS:PHAS 0",
            "TRIG:SOUR IMM",
        ]
    );
}

#[test]
fn fault_on_burst_mode_skips_the_remaining_steps() {
    let bench = bench_with_generator();
    let mut session = connected(&bench);

    bench.fail_on("BURS:MODE", 1);
    let result = DG1022::new(&mut session).configure_burst(1000.0, 5.0, 10, 0.0);

    assert!(matches!(result, Err(Error::Recovered(_))));
    let written = bench.written(DG);
    assert_eq!(&written[..2], &["APPL:SIN:CH1 1000,5,0", "BURS:STAT ON"]);
    assert!(!written.iter().any(|c| c.starts_with("BURS:NCYC") || c.starts_with("BURS:PHAS") || c.starts_with("TRIG:SOUR")));
}

#[test]
fn sine_round_trip_on_channel_two() {
    let bench = bench_with_generator();
    bench.respond(DG, "APPLy:CH2?", "SIN,1.000000e+03,5.000000e+00,-1.500000e+00");
    let mut session = connected(&bench);

    let mut dev = DG1022::new(&mut session);
    dev.configure_sine(2, 1000.0, 5.0, -1.5).unwrap();
    let state = dev.read_channel_state(2).unwrap();

    assert_eq!(
        state,
        ChannelState { waveform: Waveform::Sine, frequency_hz: 1000.0, amplitude_vpp: 5.0, offset_v: -1.5, burst_enabled: None }
    );
    assert_eq!(bench.written(DG), vec!["APPL:SIN:CH2 1000,5,-1.5", "APPLy:CH2?"]);
}

#[test]
fn channel_one_state_includes_burst_flag() {
    let bench = bench_with_generator();
    bench.respond(DG, "APPLy:CH1?", "SIN,1.000000e+03,5.000000e+00,0.000000e+00");
    bench.respond(DG, "BURS:STAT?", "ON");
    let mut session = connected(&bench);

    let state = DG1022::new(&mut session).read_channel_state(1).unwrap();
    assert_eq!(state.burst_enabled, Some(true));
    assert_eq!(bench.written(DG), vec!["APPLy:CH1?", "BURS:STAT?"]);
}

#[test]
fn malformed_state_is_not_a_comm_error() {
    let bench = bench_with_generator();
    bench.respond(DG, "APPLy:CH2?", "SIN,1.000000e+03");
    let mut session = connected(&bench);
    let lists_before = bench.list_calls();

    let e = DG1022::new(&mut session).read_channel_state(2).unwrap_err();
    assert!(matches!(e, Error::MalformedResponse { .. }));
    assert!(!e.is_comm());
    // Session untouched
    assert!(session.is_connected());
    assert_eq!(bench.list_calls(), lists_before);
}

#[test]
fn selected_channel_and_burst_queries() {
    let bench = bench_with_generator();
    bench.respond(DG, "APPLy?", "SQU,2.000000e+03,1.000000e+00,0.000000e+00");
    bench.respond(DG, "BURS:MODE?", "TRIG");
    bench.respond(DG, "BURS:STAT?", "OFF");
    bench.respond(DG, "BURS:NCYCles?", "7");
    let mut session = connected(&bench);

    let mut dev = DG1022::new(&mut session);
    dev.select_channel(1).unwrap();
    assert_eq!(dev.read_selected_state().unwrap().waveform, Waveform::Square);
    dev.set_burst(false, 0).unwrap();
    let burst = dev.read_burst_state().unwrap();
    assert_eq!(burst.mode, "TRIG");
    assert!(!burst.enabled);
    assert_eq!(burst.cycles, 7);

    assert_eq!(
        bench.written(DG),
        vec!["INSTrument:SELect CHANnel1", "APPLy?", "BURS:STAT OFF", "BURS:MODE?", "BURS:STAT?", "BURS:NCYCles?"]
    );
}

#[test]
fn output_enable_is_global() {
    let bench = bench_with_generator();
    let mut session = connected(&bench);

    let mut dev = DG1022::new(&mut session);
    dev.set_output_enabled(true).unwrap();
    dev.set_output_enabled(false).unwrap();
    assert_eq!(bench.written(DG), vec!["OUTP ON", "OUTP OFF"]);
    // Output off does not close the session
    assert!(session.is_connected());
}

#[test]
fn upload_sequence_and_activation() {
    let bench = bench_with_generator();
    let mut session = connected(&bench);

    let wf = ArbitraryWaveform::from_samples(vec![-1.0, 0.0, 1.0], 1.0, -1.0).unwrap();
    let mut dev = DG1022::new(&mut session);
    dev.upload(&wf).unwrap();
    dev.activate().unwrap();

    assert_eq!(
        bench.written(DG),
        vec![
            "VOLT:UNIT VPP",
            "VOLT:HIGH 1",
            "VOLTage:LOW -1",
            "DATA:DEL",
            "DATA:DAC VOLATILE,0,8191,16383",
            "FUNC:USER VOLATILE",
            "OUTP ON",
        ]
    );
}

#[test]
fn gaussian_burst_scales_the_frequency_by_cycle_count() {
    let bench = bench_with_generator();
    let mut session = connected(&bench);

    let burst = GaussianBurst::new(5_000_000.0, 3, 2.0).unwrap();
    assert_eq!(burst.waveform.samples.len(), 100);
    DG1022::new(&mut session).send_gaussian_burst(&burst).unwrap();

    let written = bench.written(DG);
    assert_eq!(written.len(), 6);
    let data = written[4].strip_prefix("DATA:DAC VOLATILE,").unwrap();
    assert_eq!(data.split(',').count(), 100);
    assert_eq!(written[5], format!("FREQ {}", 5_000_000.0 / 3.0));
    assert_ne!(written[5], "FREQ 5000000");
}

#[test]
fn gaussian_burst_program() {
    let bench = bench_with_generator();
    let mut session = connected(&bench);

    let burst = GaussianBurst::new(1_000_000.0, 2, 1.0).unwrap();
    DG1022::new(&mut session).run_gaussian_burst(&burst).unwrap();

    let written = bench.written(DG);
    let tail: Vec<&str> = written[6..].iter().map(|s| s.as_str()).collect();
    assert_eq!(written[5], "FREQ 500000");
    assert_eq!(
        tail,
        vec![
            "FUNC USER",
            "TRIG:SOUR IMM",
            "BURS:MODE TRIG",
            "FUNC:USER VOLATILE",
            "OUTP ON",
            "BURS:STAT ON",
            "BURS:INT:PER 0.01",
            "BURS:NCYC 1",
            "APPL:SIN:CH2 4800,1,0",
        ]
    );
}

#[test]
fn degenerate_waveform_sends_nothing() {
    let bench = bench_with_generator();
    let _session = connected(&bench);

    assert!(matches!(
        ArbitraryWaveform::from_samples(vec![0.5; 16], 1.0, -1.0),
        Err(Error::DegenerateSignal { len: 16 })
    ));
    assert!(bench.written(DG).is_empty());
}

#[test]
fn dropping_a_connected_session_disconnects() {
    let bench = bench_with_generator();
    {
        let _session = connected(&bench);
    }
    assert_eq!(bench.written(DG), vec!["OUTP OFF"]);
    assert_eq!(bench.close_calls(), 1);
}

// Only burst commands and queries pause, so elapsed time tells which class each command carried
fn paced_session(bench: &MockBench) -> Session {
    let config = SessionConfig {
        timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        reconnect_delay: Duration::from_millis(60),
        settle: SettleProfile {
            burst: Duration::from_millis(20),
            query: Duration::from_millis(30),
            ..SettleProfile::none()
        },
    };
    let mut session = Session::new(Box::new(bench.clone()), config);
    session.discover_and_connect(&Discovery::rigol_dg1022()).unwrap();
    bench.clear_written();
    session
}

#[test]
fn every_burst_step_waits_the_burst_pause() {
    let bench = bench_with_generator();
    let mut session = paced_session(&bench);

    let start = Instant::now();
    DG1022::new(&mut session).configure_burst(1000.0, 5.0, 10, 0.0).unwrap();
    assert!(start.elapsed() >= Duration::from_millis(6 * 20), "took {:?}", start.elapsed());
    assert_eq!(bench.written(DG).len(), 6);
}

#[test]
fn queries_wait_between_write_and_read() {
    let bench = bench_with_generator();
    bench.respond(DG, "APPLy:CH2?", "SIN,1.000000e+03,5.000000e+00,0.000000e+00");
    let mut session = paced_session(&bench);

    let start = Instant::now();
    DG1022::new(&mut session).read_channel_state(2).unwrap();
    assert!(start.elapsed() >= Duration::from_millis(30), "took {:?}", start.elapsed());
}

#[test]
fn recovery_waits_the_reconnect_delay() {
    let bench = bench_with_generator();
    let mut session = paced_session(&bench);

    bench.fail_on("OUTP ON", 1);
    let start = Instant::now();
    let result = DG1022::new(&mut session).set_output_enabled(true);
    assert!(matches!(result, Err(Error::Recovered(_))));
    // Reconnect delay plus the *IDN? query pause of the new probe
    assert!(start.elapsed() >= Duration::from_millis(60 + 30), "took {:?}", start.elapsed());
    assert!(session.is_connected());
}
