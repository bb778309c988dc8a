// Entry point: synthesizes phase-lagged trials and prints their connectivity network.
mod cli;

use std::error::Error;
use std::io::IsTerminal;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lagnet::config::AppConfig;
use lagnet::core::engine::ConnectivityEngine;
use lagnet::core::network::Network;
use lagnet::core::utils::LaggedSine;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .init();
}

fn print_matrix(net: &Network, cfg: &AppConfig) {
    let band = cfg.output.band();
    match band {
        Some(b) => println!("{} over {:.1}-{:.1} Hz", net.metric(), b.min_hz, b.max_hz),
        None => println!("{} over all bins", net.metric()),
    }

    let labels: Vec<&str> = net.nodes().iter().map(|n| n.label.as_str()).collect();
    print!("{:>8}", "");
    for label in &labels {
        print!("{label:>8}");
    }
    println!();
    for (label, row) in labels.iter().zip(net.connectivity_matrix(band)) {
        print!("{label:>8}");
        for v in row {
            print!("{v:>8.3}");
        }
        println!();
    }

    let threshold = cfg.output.threshold;
    for node in net.nodes() {
        println!(
            "{}: degree {} at threshold {threshold}",
            node.label,
            net.node_degree(node.index, threshold, band)
        );
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let args = cli::Args::parse();
    let cfg = AppConfig::load_or_default(&args.config);

    let fs = cfg.analysis.sampling_rate;
    let n_samples = if args.samples > 0 {
        args.samples
    } else {
        fs.round().max(1.0) as usize
    };
    let trials = LaggedSine {
        n_trials: args.trials,
        n_channels: args.channels,
        n_samples,
        sampling_rate: fs,
        freq_hz: args.freq_hz,
        lag_deg: args.lag_deg,
        noise: args.noise,
        seed: args.seed,
    }
    .trials()?;
    info!(
        "synthesized {} trials: {} channels x {n_samples} samples, {} Hz lagged {} deg",
        args.trials, args.channels, args.freq_hz, args.lag_deg
    );

    let settings = cfg.analysis.to_settings(trials);
    let net = ConnectivityEngine::new().calculate_metric(cfg.analysis.metric, &settings)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&net)?);
    } else {
        print_matrix(&net, &cfg);
    }
    Ok(())
}
