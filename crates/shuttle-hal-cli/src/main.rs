use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use shuttle_hal::virtual_hw::ControlState;
use shuttle_hal::{
    AudioConfig, AudioDevice, AudioStream, HalConfig, RecordingSleeper, SampleFormat, Sleeper,
    StreamHandle, StreamIn, StreamOut, ThreadSleeper, VirtualMixer, VirtualPcmBackend,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .ok();

    run(Cli::parse())
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Simulate(args) => execute_simulate(args),
        Commands::Controls(args) => execute_controls(args),
    }
}

#[derive(Parser)]
#[command(author, version, about = "Drive the Shuttle audio HAL against virtual hardware")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run playback (and optionally capture) through the HAL and report what
    /// reached the hardware.
    Simulate(SimulateArgs),
    /// Apply the default routes and a routing mask, then print every control.
    Controls(ControlsArgs),
}

#[derive(Args)]
struct ConfigArgs {
    /// Board configuration overrides (JSON).
    #[arg(long)]
    config: Option<PathBuf>,
}

impl ConfigArgs {
    fn load(&self) -> Result<HalConfig> {
        match &self.config {
            Some(path) => HalConfig::load(path)
                .with_context(|| format!("failed to load configuration {}", path.display())),
            None => Ok(HalConfig::default()),
        }
    }
}

#[derive(Args)]
struct SimulateArgs {
    #[command(flatten)]
    config: ConfigArgs,
    /// Number of period sized writes.
    #[arg(long, default_value_t = 50)]
    writes: usize,
    /// Screen state reported to the device before playback starts.
    #[arg(long, value_enum, default_value_t = Screen::On)]
    screen: Screen,
    /// Device routing mask (decimal or 0x prefixed hex).
    #[arg(long, value_parser = parse_mask)]
    routing: Option<u32>,
    /// Capture concurrently at this rate; reads mirror the writes.
    #[arg(long)]
    capture_rate: Option<u32>,
    /// Frames the virtual hardware reports as queued before every write.
    #[arg(long)]
    queue_frames: Option<u32>,
    /// Sleep for real instead of recording the pacing sleeps.
    #[arg(long)]
    realtime: bool,
}

#[derive(Args)]
struct ControlsArgs {
    #[command(flatten)]
    config: ConfigArgs,
    /// Device routing mask (decimal or 0x prefixed hex).
    #[arg(long, value_parser = parse_mask)]
    routing: Option<u32>,
    /// Print the effective configuration as JSON instead.
    #[arg(long)]
    print_config: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Screen {
    On,
    Off,
}

impl Screen {
    fn parameter(self) -> &'static str {
        match self {
            Screen::On => "screen_state=on",
            Screen::Off => "screen_state=off",
        }
    }
}

fn parse_mask(value: &str) -> std::result::Result<u32, String> {
    let parsed = match value.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|err| format!("invalid device mask '{value}': {err}"))
}

fn execute_simulate(args: SimulateArgs) -> Result<()> {
    let config = args.config.load()?;
    let mixer = VirtualMixer::shuttle_codec();
    let backend = VirtualPcmBackend::new();
    let recorder = Arc::new(RecordingSleeper::new());
    let sleeper: Arc<dyn Sleeper> = if args.realtime {
        Arc::new(ThreadSleeper)
    } else {
        recorder.clone()
    };
    let device = AudioDevice::open_with_sleeper(
        Box::new(mixer.clone()),
        Arc::new(backend.clone()),
        config,
        sleeper,
    )
    .context("failed to open audio device")?;

    device
        .set_parameters(args.screen.parameter())
        .context("failed to set screen state")?;
    if let Some(mask) = args.routing {
        device
            .set_parameters(&format!("routing={mask}"))
            .context("failed to apply routing")?;
    }

    let output = device
        .open_output_stream(&mut AudioConfig::default())
        .context("failed to open output stream")?;
    let input = match args.capture_rate {
        Some(rate) => {
            let mut requested = AudioConfig::new(rate, 2, SampleFormat::Pcm16);
            let stream = device
                .open_input_stream(&mut requested)
                .with_context(|| format!("capture at {rate}Hz is not supported"))?;
            Some(stream)
        }
        None => None,
    };

    let reader = input.as_ref().map(|input| {
        let input = Arc::clone(input);
        let reads = args.writes;
        thread::spawn(move || -> Result<usize> {
            let mut buffer = vec![0u8; input.buffer_size()];
            let mut silent = 0;
            for _ in 0..reads {
                input.read(&mut buffer)?;
                silent += buffer
                    .chunks_exact(4)
                    .filter(|frame| frame.iter().all(|&b| b == 0))
                    .count();
            }
            Ok(silent)
        })
    });

    let writer = {
        let output = Arc::clone(&output);
        let backend = backend.clone();
        let (writes, queue_frames) = (args.writes, args.queue_frames);
        thread::spawn(move || -> Result<()> {
            let buffer = vec![0u8; output.buffer_size()];
            for _ in 0..writes {
                if let Some(frames) = queue_frames {
                    backend.push_queue_levels([Some(frames)]);
                }
                output.write(&buffer).context("playback write failed")?;
            }
            Ok(())
        })
    };
    writer
        .join()
        .map_err(|_| anyhow::anyhow!("playback thread panicked"))??;
    info!(writes = args.writes, "playback finished");

    let silent_frames = match reader {
        Some(handle) => {
            let joined = handle
                .join()
                .map_err(|_| anyhow::anyhow!("capture thread panicked"))?;
            Some(joined.context("capture read failed")?)
        }
        None => None,
    };

    println!("Devices: {}", device.devices());
    println!("Opens:");
    for open in backend.opens() {
        println!(
            "  {:?} {} @ {}Hz x{} period {}x{}",
            open.direction,
            open.endpoint,
            open.config.rate,
            open.config.channels,
            open.config.period_size,
            open.config.period_count
        );
    }
    println!("Writes: {}", backend.write_count());
    let (target, current) = output.write_thresholds();
    println!(
        "Buffer mode: {:?} (threshold {current}/{target} frames, latency {}ms)",
        output.buffer_mode(),
        output.latency_ms()
    );
    if !args.realtime {
        println!(
            "Pacing sleeps: {} totalling {:?}",
            recorder.sleeps().len(),
            recorder.total()
        );
    }
    if let Some(silent) = silent_frames {
        println!("Muted capture frames: {silent}");
    }

    let streams =
        std::iter::once(StreamHandle::from(output)).chain(input.map(StreamHandle::from));
    for stream in streams {
        debug!(direction = ?stream.direction(), "closing stream");
        device.close_stream(stream);
    }
    print_controls(&mixer);
    Ok(())
}

fn execute_controls(args: ControlsArgs) -> Result<()> {
    let config = args.config.load()?;
    if args.print_config {
        let json = config
            .to_json_string()
            .context("failed to serialize configuration")?;
        println!("{json}");
        return Ok(());
    }

    let mixer = VirtualMixer::shuttle_codec();
    let device = AudioDevice::open(
        Box::new(mixer.clone()),
        Arc::new(VirtualPcmBackend::new()),
        config,
    )
    .context("failed to open audio device")?;
    if let Some(mask) = args.routing {
        device
            .set_parameters(&format!("routing={mask}"))
            .context("failed to apply routing")?;
    }
    println!("Devices: {}", device.devices());
    println!("Mixer controls:");
    for info in device.with_mixer(|gateway| gateway.catalog()) {
        let value = mixer
            .state(&info.name)
            .map(|state| format_state(&state))
            .unwrap_or_default();
        println!(
            "  {:>2} {:<24} {:<4} x{} {value}",
            info.id.0,
            info.name,
            info.kind.type_name(),
            info.num_values
        );
    }
    Ok(())
}

fn print_controls(mixer: &VirtualMixer) {
    println!("Mixer controls:");
    for (name, state) in mixer.snapshot() {
        println!("  {name:<24} {}", format_state(&state));
    }
}

fn format_state(state: &ControlState) -> String {
    match state {
        ControlState::Values(values) => values
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", "),
        ControlState::Item(item) => item.clone(),
    }
}
