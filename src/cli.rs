use biostream::{DEFAULT_HOST, DEFAULT_REGISTRY_PORT};
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "biostream",
    version,
    about = "Real-time multichannel biosignal streaming over loopback",
    long_about = "Runs the nodes of a biosignal streaming session: the port\n\
                  registry, the acquisition producer, the filter relay and the\n\
                  visualizer ingestion. `launch` starts a whole session."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Loopback host the session runs on
    #[arg(long, default_value = DEFAULT_HOST, global = true)]
    pub host: String,

    /// Discovery-service port agreed out-of-band
    #[arg(long, default_value_t = DEFAULT_REGISTRY_PORT, global = true)]
    pub registry_port: u16,
}

#[derive(Subcommand)]
pub enum Command {
    /// Allocate session ports and spawn one process per node
    Launch(LaunchArgs),
    /// Run the port registry
    Registry(RegistryArgs),
    /// Run the acquisition producer node
    Acquire(AcquireArgs),
    /// Run the filter relay node
    Filter,
    /// Run the visualizer ingestion node
    View(ViewArgs),
}

#[derive(Args)]
pub struct LaunchArgs {
    /// Device passed to the acquisition child
    #[arg(long, default_value = "test")]
    pub device: String,

    /// Window length passed to the visualizer child, in seconds
    #[arg(long, default_value_t = 10.0)]
    pub window_secs: f64,
}

#[derive(Args)]
pub struct RegistryArgs {
    /// Stream name to port table, as JSON (e.g. '{"EEGData":9001}')
    #[arg(long)]
    pub ports_json: String,
}

#[derive(Args)]
pub struct AcquireArgs {
    /// Signal source: "test"/"noise" for simulated data, or a .csv path
    #[arg(long, default_value = "test")]
    pub device: String,

    /// Sample rate assumed for file playback, in Hz
    #[arg(long, default_value_t = 500.0)]
    pub rate: f64,

    /// Samples per chunk for file playback
    #[arg(long, default_value_t = 20)]
    pub chunk_size: usize,
}

#[derive(Args)]
pub struct ViewArgs {
    /// Seconds of signal retained for display
    #[arg(long, default_value_t = 10.0)]
    pub window_secs: f64,

    /// Apply common-average referencing to incoming chunks
    #[arg(long)]
    pub car: bool,

    /// High-pass cutoff requested from the filter node, in Hz
    #[arg(long)]
    pub hp: Option<f32>,

    /// Low-pass cutoff requested from the filter node, in Hz
    #[arg(long)]
    pub lp: Option<f32>,
}
