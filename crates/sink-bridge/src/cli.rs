use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "sink-bridge", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Where drained audio goes
    #[arg(long, value_enum, default_value_t = OutputKind::Cpal)]
    pub output: OutputKind,

    /// Hardware sample rate of the PCM stream (Hz)
    #[arg(long, default_value_t = 44_100)]
    pub sample_rate: u32,

    /// Interleaved channel count of the PCM stream
    #[arg(long, default_value_t = 2)]
    pub channels: u16,

    /// Ring buffer capacity in bytes
    #[arg(long, default_value_t = 32 * 1024)]
    pub capacity_bytes: usize,

    /// Prefetch target in bytes (output starts once this much is buffered)
    #[arg(long, default_value_t = 20 * 1024)]
    pub high_watermark: usize,

    /// Dropping ends once occupancy falls to this many bytes
    #[arg(long, default_value_t = 10 * 1024)]
    pub low_watermark: usize,

    /// Size the ring for this many seconds instead (overrides capacity and watermarks)
    #[arg(long)]
    pub buffer_seconds: Option<f32>,

    /// Largest chunk written to the output per transfer, in bytes
    #[arg(long, default_value_t = 240 * 6)]
    pub chunk_bytes: usize,

    /// Drain-side wait before declaring an underflow (ms)
    #[arg(long, default_value_t = 20)]
    pub dequeue_timeout_ms: u64,

    /// Producer-side wait for free space before dropping (ms)
    #[arg(long, default_value_t = 0)]
    pub enqueue_timeout_ms: u64,

    /// Longest a single output write may block (ms)
    #[arg(long, default_value_t = 500)]
    pub write_timeout_ms: u64,

    /// Blocks queued towards the device callback
    #[arg(long, default_value_t = 4)]
    pub dma_blocks: usize,

    /// Initial gain in dB
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub gain_db: f32,

    /// Status log interval (ms); 0 disables
    #[arg(long, default_value_t = 2000)]
    pub status_interval_ms: u64,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Read raw little-endian s16 PCM from stdin
    Stdin {
        /// Bytes read and submitted per burst
        #[arg(long, default_value_t = 4096)]
        burst_bytes: usize,
    },

    /// Generate a sine tone
    Tone {
        /// Tone frequency (Hz)
        #[arg(long, default_value_t = 440.0)]
        freq: f32,

        /// Duration (seconds)
        #[arg(long, default_value_t = 5.0)]
        seconds: f32,

        /// Peak amplitude, 0.0..=1.0
        #[arg(long, default_value_t = 0.5)]
        amplitude: f32,

        /// Audio per submitted burst (ms)
        #[arg(long, default_value_t = 20)]
        burst_ms: u64,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputKind {
    /// Play through a CPAL output device
    Cpal,
    /// Discard at real-time pace
    Paced,
    /// Discard as fast as possible
    Null,
}
