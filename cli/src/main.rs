use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use tonemodem_core::wav::{SampleFormat, WavSink, WavSource};
use tonemodem_core::{
    Framebits, FskPlan, ModemError, NullSink, Receiver, Result, RxConfig, SampleSink, SampleSource,
    ToneGenerator, Transmitter, TxConfig, CARRIER_AUTODETECT_THRESHOLD, DEFAULT_CONFIDENCE_SEARCH_LIMIT,
    DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_SAMPLE_RATE, DEFAULT_TX_SIN_TABLE_LEN,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tonemodem", version)]
#[command(about = "software Bell-type and RTTY FSK modem over audio files")]
struct Cli {
    /// Transmit mode
    #[arg(short = 't', long = "tx", visible_aliases = ["transmit", "write"])]
    tx: bool,

    /// Receive mode (default)
    #[arg(short = 'r', long = "rx", visible_aliases = ["receive", "read"])]
    rx: bool,

    /// Minimum SNR confidence to accept a frame
    #[arg(short = 'c', long, value_name = "min-snr-threshold",
          default_value_t = DEFAULT_CONFIDENCE_THRESHOLD)]
    confidence: f32,

    /// Early-exit confidence in the frame search
    #[arg(short = 'l', long, value_name = "max-snr-search-limit",
          default_value_t = DEFAULT_CONFIDENCE_SEARCH_LIMIT)]
    limit: f32,

    /// Automatically detect the carrier band
    #[arg(short = 'a', long = "auto-carrier")]
    auto_carrier: bool,

    /// ASCII 8-N-1
    #[arg(short = '8', long = "ascii")]
    ascii: bool,

    /// Baudot 5-N-1
    #[arg(short = '5', long = "baudot")]
    baudot: bool,

    /// Read/write audio from/to a WAV file instead of system audio
    #[arg(short = 'f', long, value_name = "filename.wav")]
    file: Option<PathBuf>,

    /// Receive DFT bin width in Hz
    #[arg(short = 'b', long, value_name = "rx_bandwidth")]
    bandwidth: Option<f32>,

    /// Mark tone frequency in Hz
    #[arg(short = 'M', long, value_name = "mark_freq")]
    mark: Option<f32>,

    /// Space tone frequency in Hz
    #[arg(short = 'S', long, value_name = "space_freq")]
    space: Option<f32>,

    /// Transmit stop bit length in bits (e.g. 1.5 for RTTY)
    #[arg(short = 'T', long, value_name = "m.n")]
    txstopbits: Option<f32>,

    /// Suppress CARRIER / NOCARRIER lines on stderr
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Audio sample rate
    #[arg(short = 'R', long, value_name = "rate", default_value_t = DEFAULT_SAMPLE_RATE)]
    samplerate: u32,

    /// Transmit sine table length; 0 disables the LUT
    #[arg(long, value_name = "tx_sin_table_len", default_value_t = DEFAULT_TX_SIN_TABLE_LEN)]
    lut: usize,

    /// Write 32-bit float samples instead of 16-bit integers
    #[arg(long = "float-samples")]
    float_samples: bool,

    /// Run tone-generation benchmarks and exit
    #[arg(long)]
    benchmarks: bool,

    /// "rtty", or a numeric bit rate (300 = Bell 103, 1200 = Bell 202)
    #[arg(value_name = "baudmode")]
    baudmode: Option<String>,
}

/// Modem parameters resolved from the baudmode and rate-band defaults.
struct ModemParams {
    data_rate: f32,
    n_data_bits: u32,
    mark_hz: f32,
    space_hz: f32,
    band_width: f32,
    txstopbits: f32,
    /// Mark-to-space distance assumed by carrier auto-detection.
    autodetect_shift_hz: f32,
}

fn resolve_params(cli: &Cli, baudmode: &str) -> Result<ModemParams> {
    let rtty = baudmode.eq_ignore_ascii_case("rtty");
    let data_rate = if rtty {
        45.45
    } else {
        baudmode.parse::<f32>().map_err(|_| {
            ModemError::InvalidConfig(format!("bad baudmode \"{baudmode}\" (try \"300\")"))
        })?
    };
    if !(data_rate > 0.0) {
        return Err(ModemError::InvalidConfig(
            "baudmode rate must be positive".into(),
        ));
    }

    let n_data_bits = if cli.baudot {
        5
    } else if cli.ascii {
        8
    } else if rtty {
        5
    } else {
        8
    };

    // Bell 202: baud=1200 mark=1200 space=2200
    // Bell 103: baud=300  mark=1270 space=1070 (ITU-T V.21: 1280/1080)
    // RTTY:     baud=45.45 mark/space variable, shift 170
    let (autodetect_shift_hz, default_mark, default_width) = if data_rate >= 400.0 {
        (-(data_rate * 5.0 / 6.0), data_rate / 2.0 + 600.0, 200.0)
    } else if data_rate >= 100.0 {
        (200.0, 1270.0, 50.0)
    } else {
        (170.0, 1585.0, 10.0)
    };

    let mark_hz = cli.mark.unwrap_or(default_mark);
    let space_hz = cli.space.unwrap_or(mark_hz - autodetect_shift_hz);
    let band_width = cli.bandwidth.unwrap_or(default_width).min(data_rate);
    let txstopbits = cli
        .txstopbits
        .unwrap_or(if rtty { 1.5 } else { 1.0 });

    Ok(ModemParams {
        data_rate,
        n_data_bits,
        mark_hz,
        space_hz,
        band_width,
        txstopbits,
        autodetect_shift_hz,
    })
}

fn transmit(cli: &Cli, params: &ModemParams, file: &PathBuf) -> Result<()> {
    let format = if cli.float_samples {
        SampleFormat::F32
    } else {
        SampleFormat::S16
    };
    let mut sink = WavSink::create(file, cli.samplerate, format)?;

    let mut config = TxConfig::new(params.data_rate, params.mark_hz, params.space_hz);
    config.stop_bits = params.txstopbits;
    config.sin_table_len = cli.lut;

    let codec = Framebits::for_data_bits(params.n_data_bits);
    let mut tx = Transmitter::new(codec, config, cli.samplerate)?;
    tx.run(io::stdin().lock(), &mut sink)?;
    sink.finalize()
}

fn receive(cli: &Cli, params: &ModemParams, file: &PathBuf) -> Result<()> {
    let mut source = WavSource::open(file)?;

    // The plan is built from the file's actual sample rate.
    let plan = FskPlan::new(
        source.sample_rate(),
        params.mark_hz,
        params.space_hz,
        params.band_width,
        params.n_data_bits,
    )?;

    let mut config = RxConfig::new(params.data_rate);
    config.confidence_threshold = cli.confidence;
    config.confidence_search_limit = cli.limit;
    config.autodetect_shift_hz = params.autodetect_shift_hz;
    if cli.auto_carrier {
        config.carrier_autodetect_threshold = Some(CARRIER_AUTODETECT_THRESHOLD);
    }

    let codec = Framebits::for_data_bits(params.n_data_bits);
    let mut rx = Receiver::new(plan, codec, config)?;

    let quiet = cli.quiet;
    let stdout = io::stdout();
    rx.run(&mut source, &mut stdout.lock(), |event| {
        if !quiet {
            eprintln!("{event}");
        }
    })
}

fn generate_test_tones<S: SampleSink>(
    gen: &mut ToneGenerator,
    sink: &mut S,
    duration_sec: u32,
) -> Result<()> {
    let burst = gen.sample_rate() as usize / 20;
    for _ in 0..duration_sec * 10 {
        sink.write(&gen.tone(1000.0, burst))?;
        sink.write(&gen.tone(1777.0, burst))?;
    }
    Ok(())
}

fn run_benchmarks(sample_rate: u32) -> Result<()> {
    println!("tonemodem {} benchmarks", env!("CARGO_PKG_VERSION"));
    for lut_len in [1024usize, 0] {
        let label = if lut_len > 0 {
            format!("lut{lut_len}")
        } else {
            "nolut".to_string()
        };
        let mut gen = ToneGenerator::new(sample_rate, lut_len);
        let mut sink = NullSink::new(sample_rate);
        let start = Instant::now();
        generate_test_tones(&mut gen, &mut sink, 10)?;
        let elapsed = start.elapsed().as_secs_f64();
        println!(
            "generate-tones-{label}-mono: {:.0} samples/s ({} samples in {:.3} s)",
            sink.nsamples() as f64 / elapsed,
            sink.nsamples(),
            elapsed
        );
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    if cli.benchmarks {
        return run_benchmarks(cli.samplerate);
    }

    if cli.tx && cli.rx {
        return Err(ModemError::InvalidConfig(
            "--tx and --rx are mutually exclusive".into(),
        ));
    }

    let baudmode = cli.baudmode.as_deref().ok_or_else(|| {
        ModemError::InvalidConfig("must specify {baudmode} (try \"300\")".into())
    })?;
    let params = resolve_params(cli, baudmode)?;

    let file = cli.file.as_ref().ok_or_else(|| {
        ModemError::InvalidConfig(
            "this build has no system audio backend; use --file".into(),
        )
    })?;

    if cli.tx {
        transmit(cli, &params, file)
    } else {
        receive(cli, &params, file)
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("E: {e}");
            ExitCode::from(1)
        }
    }
}
