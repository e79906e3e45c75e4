//! End-to-end loopbacks: transmit into memory, receive from the same
//! buffer, check decoded output and carrier lifecycle.

use tonemodem_core::{
    CarrierEvent, Framebits, FskPlan, MemorySink, MemorySource, Receiver, RxConfig, Transmitter,
    TxConfig,
};

const SAMPLE_RATE: u32 = 48000;

fn transmit(text: &[u8], config: TxConfig, n_data_bits: u32) -> Vec<f32> {
    let codec = Framebits::for_data_bits(n_data_bits);
    let mut tx = Transmitter::new(codec, config, SAMPLE_RATE).unwrap();
    let mut sink = MemorySink::new(SAMPLE_RATE);
    tx.run(text, &mut sink).unwrap();
    sink.into_samples()
}

fn receive(samples: Vec<f32>, plan: FskPlan, config: RxConfig) -> (Vec<u8>, Vec<CarrierEvent>) {
    let codec = Framebits::for_data_bits(plan.n_data_bits());
    let mut rx = Receiver::new(plan, codec, config).unwrap();
    let mut source = MemorySource::new(samples, SAMPLE_RATE);
    let mut out = Vec::new();
    let mut events = Vec::new();
    rx.run(&mut source, &mut out, |e| events.push(*e)).unwrap();
    (out, events)
}

fn lost_report(events: &[CarrierEvent]) -> tonemodem_core::NoCarrierReport {
    match events {
        [CarrierEvent::Acquired { .. }, CarrierEvent::Lost(report)] => *report,
        other => panic!("expected exactly acquire+lose, got {other:?}"),
    }
}

#[test]
fn test_silence_in_no_output_no_events() {
    let plan = FskPlan::new(SAMPLE_RATE, 1270.0, 1070.0, 50.0, 8).unwrap();
    let five_seconds = vec![0.0f32; 5 * SAMPLE_RATE as usize];
    let (out, events) = receive(five_seconds, plan, RxConfig::new(300.0));
    assert!(out.is_empty());
    assert!(events.is_empty());
}

#[test]
fn test_ascii_loopback_bell103() {
    let samples = transmit(b"Hello\n", TxConfig::new(300.0, 1270.0, 1070.0), 8);

    let plan = FskPlan::new(SAMPLE_RATE, 1270.0, 1070.0, 50.0, 8).unwrap();
    let (out, events) = receive(samples, plan, RxConfig::new(300.0));

    assert_eq!(out, b"Hello\n");
    let report = lost_report(&events);
    assert_eq!(report.nframes_decoded, 6);
}

#[test]
fn test_rtty_baudot_loopback() {
    let mut config = TxConfig::new(45.45, 1585.0, 1415.0);
    config.stop_bits = 1.5;
    let samples = transmit(b"RYRY\r\n", config, 5);

    let plan = FskPlan::new(SAMPLE_RATE, 1585.0, 1415.0, 10.0, 5).unwrap();
    let (out, events) = receive(samples, plan, RxConfig::new(45.45));

    assert_eq!(out, b"RYRY\r\n");
    // six characters, one frame each; no shift codes in this message
    let report = lost_report(&events);
    assert_eq!(report.nframes_decoded, 6);
}

#[test]
fn test_baudot_shifted_figures_loopback() {
    let mut config = TxConfig::new(45.45, 1585.0, 1415.0);
    config.stop_bits = 1.5;
    let samples = transmit(b"QTH 599\r\n", config, 5);

    let plan = FskPlan::new(SAMPLE_RATE, 1585.0, 1415.0, 10.0, 5).unwrap();
    let (out, events) = receive(samples, plan, RxConfig::new(45.45));

    assert_eq!(out, b"QTH 599\r\n");
    // nine characters plus one FIGS shift word
    let report = lost_report(&events);
    assert_eq!(report.nframes_decoded, 10);
}

#[test]
fn test_bell202_loopback_throughput() {
    let samples = transmit(b"12345", TxConfig::new(1200.0, 1200.0, 2200.0), 8);

    let plan = FskPlan::new(SAMPLE_RATE, 1200.0, 2200.0, 200.0, 8).unwrap();
    let (out, events) = receive(samples, plan, RxConfig::new(1200.0));

    assert_eq!(out, b"12345");
    let report = lost_report(&events);
    assert_eq!(report.nframes_decoded, 5);
    assert!(
        (report.throughput - 1200.0).abs() / 1200.0 < 0.005,
        "throughput {} off by more than 0.5%",
        report.throughput
    );
}

#[test]
fn test_carrier_drop_single_report() {
    let mut samples = transmit(b"ABC", TxConfig::new(300.0, 1270.0, 1070.0), 8);
    // two further seconds of dead air after the transmitter went idle
    samples.extend(std::iter::repeat(0.0).take(2 * SAMPLE_RATE as usize));

    let plan = FskPlan::new(SAMPLE_RATE, 1270.0, 1070.0, 50.0, 8).unwrap();
    let (out, events) = receive(samples, plan, RxConfig::new(300.0));

    assert_eq!(out, b"ABC", "no spurious bytes from the silence");
    assert_eq!(events.len(), 2, "exactly one CARRIER and one NOCARRIER");
    assert!(matches!(events[0], CarrierEvent::Acquired { .. }));
    assert!(matches!(events[1], CarrierEvent::Lost(_)));
}

#[test]
fn test_auto_carrier_acquires_offset_signal() {
    // transmitted 50 Hz above the Bell 103 defaults
    let samples = transmit(b"HELLO", TxConfig::new(300.0, 1320.0, 1120.0), 8);

    let plan = FskPlan::new(SAMPLE_RATE, 1270.0, 1070.0, 50.0, 8).unwrap();
    let mut config = RxConfig::new(300.0);
    config.carrier_autodetect_threshold = Some(0.001);
    config.autodetect_shift_hz = 200.0;
    let (out, events) = receive(samples, plan, config);

    assert_eq!(out, b"HELLO");
    match events[0] {
        CarrierEvent::Acquired { mark_hz, .. } => {
            assert!(
                (mark_hz - 1320.0).abs() <= 25.0,
                "acquired at {mark_hz} Hz, expected within half a band of 1320"
            );
        }
        other => panic!("expected carrier acquisition first, got {other:?}"),
    }
    let report = lost_report(&events);
    match report.skew {
        None => {}
        Some(skew) => assert!(skew.abs() < 0.01, "rate skew {skew} exceeds 1%"),
    }
}

#[test]
fn test_loopback_survives_added_noise() {
    let mut samples = transmit(b"NOISY", TxConfig::new(300.0, 1270.0, 1070.0), 8);
    // deterministic pseudo-noise at ~7% of full scale over the
    // modulated portion
    let modulated = samples.len() - SAMPLE_RATE as usize / 2;
    for (i, sample) in samples[..modulated].iter_mut().enumerate() {
        *sample += 0.07 * ((i as f32 * 12.9898).sin() * 43758.547).fract();
    }

    let plan = FskPlan::new(SAMPLE_RATE, 1270.0, 1070.0, 50.0, 8).unwrap();
    let (out, _events) = receive(samples, plan, RxConfig::new(300.0));
    assert_eq!(out, b"NOISY");
}

#[test]
fn test_leading_silence_before_carrier() {
    let mut samples = vec![0.0f32; SAMPLE_RATE as usize];
    samples.extend(transmit(b"LATE", TxConfig::new(300.0, 1270.0, 1070.0), 8));

    let plan = FskPlan::new(SAMPLE_RATE, 1270.0, 1070.0, 50.0, 8).unwrap();
    let (out, events) = receive(samples, plan, RxConfig::new(300.0));
    assert_eq!(out, b"LATE");
    assert_eq!(lost_report(&events).nframes_decoded, 4);
}
