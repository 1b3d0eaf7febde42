//! desdeo-panel: read decision-maker input from the DESDEO control panel.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use desdeo_panel::{demo_session, load_config, SerialTransport};
use panel_core::{ButtonRole, FrameSource, Gesture, Registry, Target, Wait};
use panel_proto::ChecksumTable;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "desdeo-panel")]
#[command(about = "Read decision-maker input from the DESDEO control panel")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "desdeo-panel.toml")]
    config: PathBuf,

    /// Serial port path; skips discovery by description
    #[arg(short, long)]
    port: Option<String>,

    /// Substring of the port description used for discovery
    #[arg(long)]
    port_filter: Option<String>,

    /// Serial baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Use a scripted panel session instead of hardware
    #[arg(long)]
    simulate: bool,

    /// Value to read, as NAME:LOWER:UPPER (repeatable)
    #[arg(short, long = "target", value_parser = parse_target)]
    targets: Vec<Target>,

    /// Round values to integers
    #[arg(long)]
    as_int: bool,

    /// Give up after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Classify one gesture on the confirm button instead of reading values
    #[arg(long)]
    gesture: bool,
}

fn parse_target(s: &str) -> Result<Target, String> {
    let mut parts = s.rsplitn(3, ':');
    let (Some(upper), Some(lower), Some(name)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(format!("expected NAME:LOWER:UPPER, got {s:?}"));
    };
    let lower: f64 = lower.parse().map_err(|e| format!("bad lower bound {lower:?}: {e}"))?;
    let upper: f64 = upper.parse().map_err(|e| format!("bad upper bound {upper:?}: {e}"))?;
    if upper <= lower {
        return Err(format!("upper bound must exceed lower bound in {s:?}"));
    }
    Ok(Target::new(name, lower, upper))
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!("desdeo-panel v{}", env!("CARGO_PKG_VERSION"));

    let mut config = load_config(&args.config)?;
    if let Some(filter) = args.port_filter {
        config.serial.port_filter = filter;
    }
    if let Some(baud) = args.baud {
        config.serial.baud_rate = baud;
    }

    let source: Box<dyn FrameSource> = if args.simulate {
        info!("using a simulated panel");
        config.discovery_window_ms = 0;
        let table = ChecksumTable::new(config.checksum_key);
        Box::new(demo_session(args.targets.len(), &config.roles, &table))
    } else if let Some(path) = &args.port {
        Box::new(SerialTransport::open(path, &config.serial)?)
    } else {
        let transport = SerialTransport::discover(&config.serial)
            .context("is the panel plugged in?")?;
        info!("using {}", transport.name());
        Box::new(transport)
    };

    let wait = match args.timeout {
        Some(secs) => Wait::timeout(Duration::from_secs(secs)),
        None => Wait::forever(),
    };

    info!("discovering panel components");
    let mut panel = Registry::connect(source, config, args.targets)?;
    for bound in panel.targets() {
        info!("{} -> {}", bound.target.name, bound.address);
    }

    if args.gesture {
        println!("Click, double click or hold the confirm button");
        let gesture = panel.action(ButtonRole::Confirm, &wait)?;
        if gesture == Gesture::None {
            warn!("no press before the timeout");
        }
        println!("{gesture:?}");
    } else if panel.targets().is_empty() {
        println!("Press confirm or decline");
        let accepted = panel.confirm(&wait)?;
        println!("{}", if accepted { "confirmed" } else { "declined" });
    } else {
        panel.push_bounds()?;
        println!("Set the values and press confirm");
        let values = panel.get_target_values(args.as_int, &wait)?;
        for (bound, value) in panel.targets().iter().zip(&values) {
            println!("{} = {value}", bound.target.name);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target() {
        let target = parse_target("net:cost:-5:12.5").unwrap();
        assert_eq!(target, Target::new("net:cost", -5.0, 12.5));
        assert!(parse_target("price:1").is_err());
        assert!(parse_target("price:x:2").is_err());
        assert!(parse_target("price:3:3").is_err());
    }
}
