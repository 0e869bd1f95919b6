//! Solfa command-line entry point
//!
//! Usage:
//!   solfa [--midi PORT] [--channel 1-16] [--no-reverb] [--seed N]
//!   solfa --list-midi
//!
//! Without `--midi` the built-in synth plays through the default output
//! device. `RUST_LOG` controls diagnostic output.

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use solfa::audio::{AudioContext, Backend, MidiClock};
use solfa_core::DrillSettings;
use std::str::FromStr;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--list-midi") {
        let ports = MidiClock::list_ports()?;
        if ports.is_empty() {
            println!("No MIDI output ports found");
        }
        for (i, port) in ports.iter().enumerate() {
            println!("  {}: {}", i, port);
        }
        return Ok(());
    }

    let channel: u8 = parse_flag(&args, "--channel")?.unwrap_or(1);
    if !(1..=16).contains(&channel) {
        return Err(anyhow!("MIDI channel must be 1-16, got {}", channel));
    }

    let backend = match parse_flag::<String>(&args, "--midi")? {
        Some(port) => Backend::Midi(MidiClock::new(&port, channel - 1)?),
        None => Backend::Synth(AudioContext::new(!args.iter().any(|a| a == "--no-reverb"))),
    };
    log::info!("using {}", backend.describe());

    let rng = match parse_flag::<u64>(&args, "--seed")? {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    solfa::repl::start(backend, DrillSettings::default(), rng)
}

/// Value following `flag`; `None` when the flag is absent
fn parse_flag<T: FromStr>(args: &[String], flag: &str) -> Result<Option<T>> {
    let Some(i) = args.iter().position(|a| a == flag) else {
        return Ok(None);
    };
    let value = match args.get(i + 1) {
        Some(v) if !v.starts_with("--") => v,
        _ => return Err(anyhow!("{} needs a value", flag)),
    };
    value
        .parse()
        .map(Some)
        .map_err(|_| anyhow!("Invalid value '{}' for {}", value, flag))
}
