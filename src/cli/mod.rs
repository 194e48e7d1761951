//! CLI argument parsing and validation module
//!
//! Handles command-line interface using clap, including:
//! - Configuration file selection
//! - Debug verbosity
//! - Polling interval and output format overrides
//! - Printing the default configuration

use anyhow::{anyhow, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;

use crate::config::{MonitorConfiguration, OutputFormat};
use crate::constants::{APP_NAME, POLLING_INTERVAL_MAX, POLLING_INTERVAL_MIN};

/// Options collected from the command line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliOptions {
    /// Configuration file; built-in defaults when absent
    pub config_path: Option<PathBuf>,
    /// Enable debug logging
    pub debug: bool,
    /// Polling interval override in seconds
    pub interval: Option<f64>,
    /// Force JSON-lines output
    pub json_output: bool,
    /// Print the default configuration and exit
    pub print_config: bool,
}

impl CliOptions {
    /// Apply command-line overrides on top of the loaded configuration
    pub fn apply_overrides(&self, config: &mut MonitorConfiguration) {
        if let Some(interval) = self.interval {
            config.general.polling_interval = interval;
        }
        if self.json_output {
            config.general.output_format = OutputFormat::Json;
        }
    }
}

fn version_string() -> &'static str {
    concat!(env!("PROCSENTINEL_VERSION"), " (", env!("PROCSENTINEL_GIT_HASH"), ")")
}

/// Build the clap command definition
pub fn build_command() -> Command {
    Command::new(APP_NAME)
        .version(version_string())
        .about("Monitor the process table for created, terminated, and modified processes")
        .long_about(
            "Polls the process table, compares each snapshot with the previous one, and reports \
             process creation, termination, and attribute changes (command line, threads, handles, \
             memory, working directory).",
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .help("Configuration file (TOML). Built-in defaults are used when omitted")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .help("Enable debug logging")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("interval")
                .short('i')
                .long("interval")
                .value_name("SECONDS")
                .help("Polling interval in seconds (minimum 0.1), overrides the configuration file")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("json")
                .short('j')
                .long("json")
                .help("Output events as JSON lines")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("print-config")
                .long("print-config")
                .help("Print the default configuration as TOML and exit")
                .action(ArgAction::SetTrue),
        )
}

/// Parse command line arguments and return options
pub fn parse_args() -> Result<CliOptions> {
    options_from_matches(&build_command().get_matches())
}

/// Parse an explicit argument list (first item is the program name)
pub fn parse_from<I, T>(args: I) -> Result<CliOptions>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let matches = build_command().try_get_matches_from(args)?;
    options_from_matches(&matches)
}

fn options_from_matches(matches: &ArgMatches) -> Result<CliOptions> {
    let interval = matches.get_one::<f64>("interval").copied();
    if let Some(interval) = interval {
        if !interval.is_finite() || interval < POLLING_INTERVAL_MIN {
            return Err(anyhow!(
                "Invalid polling interval: {}. Minimum is {} seconds",
                interval,
                POLLING_INTERVAL_MIN
            ));
        }
        if interval > POLLING_INTERVAL_MAX {
            return Err(anyhow!(
                "Invalid polling interval: {}. Maximum is {} seconds",
                interval,
                POLLING_INTERVAL_MAX
            ));
        }
    }

    let config_path = matches.get_one::<PathBuf>("config").cloned();
    if let Some(path) = &config_path {
        if !path.exists() {
            return Err(anyhow!("Configuration file does not exist: {}", path.display()));
        }
    }

    Ok(CliOptions {
        config_path,
        debug: matches.get_flag("debug"),
        interval,
        json_output: matches.get_flag("json"),
        print_config: matches.get_flag("print-config"),
    })
}
