use anyhow::{anyhow, Context, Result};
use netguard::config::validate_scan_interval;
use netguard::{logging, privileges, Collaborators, EngineConfig, NetworkMonitor, SweepMode};

fn print_usage() {
    println!("Usage: netguard [OPTIONS]");
    println!("Options:");
    println!("  -i, --interval <SECS>   seconds between scans (min 30, default 60)");
    println!("  -s, --sweep <MODE>      nmap or icmp (default nmap)");
    println!("  --once                  run one scan, print devices, stats and host info as JSON");
    println!("  -h, --help              show this help message");
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init()?;

    let mut config = EngineConfig::from_env();
    let mut once = false;

    let raw_args: Vec<String> = std::env::args().collect();
    let mut args = raw_args.iter().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--interval" | "-i" => {
                let raw = args.next().ok_or_else(|| anyhow!("--interval needs a value"))?;
                let secs: i64 = raw
                    .parse()
                    .with_context(|| format!("invalid interval '{}'", raw))?;
                config.scan_interval_secs = validate_scan_interval(secs)?;
            }
            "--sweep" | "-s" => {
                let raw = args.next().ok_or_else(|| anyhow!("--sweep needs a value"))?;
                config.sweep_mode = raw.parse::<SweepMode>()?;
            }
            "--once" => once = true,
            "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            other => {
                print_usage();
                return Err(anyhow!("unknown argument '{}'", other));
            }
        }
    }

    if !privileges::is_elevated() {
        tracing::warn!("Not running elevated; sweeps and enforcement may be limited");
    }

    let monitor = NetworkMonitor::new(&config, Collaborators::system(&config));

    if once {
        monitor.run_cycle().await?;
        let report = serde_json::json!({
            "network": monitor.network_info().await,
            "devices": monitor.devices().await,
            "stats": monitor.stats(),
            "system": monitor.system_info().await,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let background = monitor.spawn_background();
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    tracing::info!("Shutting down");
    monitor.shutdown();
    background.await.context("background scan task panicked")?;
    Ok(())
}
