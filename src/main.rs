#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use log::info;

use procsentinel::cli;
use procsentinel::config::MonitorConfiguration;
use procsentinel::logging;
use procsentinel::monitor::SysinfoSource;
use procsentinel::output::EventWriter;
use procsentinel::supervisor::ProcessMonitor;

#[tokio::main]
async fn main() -> Result<()> {
    let options = cli::parse_args()?;

    if options.print_config {
        print!("{}", MonitorConfiguration::default().to_toml_string()?);
        return Ok(());
    }

    logging::init_logger(options.debug)?;

    if options.config_path.is_none() {
        info!("No configuration file given, using built-in defaults");
    }

    // Configuration problems are fatal before any monitoring starts
    let config = MonitorConfiguration::load(options.config_path.as_deref(), |config| {
        options.apply_overrides(config)
    })
    .context("Invalid configuration")?;

    let mut writer = EventWriter::stdout(config.general.output_format);
    if config.event_log.enabled {
        writer = writer.with_event_log(&config.event_log.path)?;
    }

    logging::log_startup(options.config_path.as_deref(), &config);

    let monitor = ProcessMonitor::start(&config, SysinfoSource::new(), writer);
    monitor.run_until_shutdown().await?;

    Ok(())
}
