use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Args {
    /// Path to config TOML
    #[arg(long, default_value = "lagnet.toml")]
    pub config: String,

    /// Number of synthetic trials
    #[arg(long, default_value_t = 40)]
    pub trials: usize,

    /// Number of synthetic channels
    #[arg(long, default_value_t = 4)]
    pub channels: usize,

    /// Samples per trial (0 = one second at the configured sampling rate)
    #[arg(long, default_value_t = 0)]
    pub samples: usize,

    /// Phase lag between neighbouring channels, degrees
    #[arg(long, default_value_t = 45.0)]
    pub lag_deg: f64,

    /// Frequency of the shared sinusoid, Hz
    #[arg(long, default_value_t = 10.0)]
    pub freq_hz: f64,

    /// Noise amplitude relative to the sinusoid
    #[arg(long, default_value_t = 0.5)]
    pub noise: f64,

    /// RNG seed for the synthetic trials
    #[arg(long, default_value_t = 1)]
    pub seed: u64,

    /// Print the full network as JSON instead of the band matrix
    #[arg(long, default_value_t = false)]
    pub json: bool,
}
