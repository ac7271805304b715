//! The command-line arguments and configuration system of the `bump-fix` binary.

use bump_core::config::Config;
use clap::Parser;
use config::FileFormat::Toml;
use directories::ProjectDirs;
use std::error::Error;
use std::path::{Path, PathBuf};

/// Command-line arguments of `bump-fix`.
#[derive(Debug, Parser)]
#[command(name = "bump-fix", about = "Repairs Java projects broken by a dependency upgrade")]
pub struct Args {
    /// Set a configuration value; format $NAME=$VALUE.
    #[arg(long, short)]
    pub config: Vec<String>,

    /// Erase the output directory if nonempty.
    #[arg(long, short)]
    pub force: bool,

    /// Dataset of breaking updates: a JSON file, or a directory of JSON files.
    // Should always be present unless using a flag like --print-config-path
    pub input: Option<PathBuf>,

    /// Prints out the location of the config file.
    #[arg(long)]
    pub print_config_path: bool,

    /// Directory receiving working directories, results and summaries.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Log at debug level, overriding `log_filter`.
    #[arg(short, long)]
    pub verbose: bool,

    /// Locate and classify the errors of each breaking build without repairing anything.
    #[arg(long)]
    pub analyze_only: bool,
}

/// Parses and validates the config; to be called by main() before anything reads it.
///
/// Returns `None` if a flag that calls for an early exit (such as --print-config-path) was
/// provided.
pub fn initialize(args: &Args) -> Result<Option<Config>, Box<dyn Error>> {
    let dirs = ProjectDirs::from("", "", "bump").ok_or("no home directory")?;
    if args.print_config_path {
        println!("Config file location: {:?}", config_file(dirs.config_dir()));
        return Ok(None);
    }
    let config = load_config(args, dirs.config_dir())?;
    config.validate();
    Ok(Some(config))
}

fn load_config(args: &Args, config_dir: &Path) -> Result<Config, Box<dyn Error>> {
    let mut settings = config::Config::builder()
        .add_source(config::File::from_str(include_str!("../default_config.toml"), Toml))
        .add_source(config::File::from(config_file(config_dir)).required(false))
        .add_source(config::File::from(PathBuf::from("config.toml")).required(false));
    for config_arg in &args.config {
        let (name, value) = config_arg
            .split_once('=')
            .ok_or_else(|| format!("failed to parse config value {config_arg:?}; no '=' found"))?;
        settings = settings.set_override(name, value)?;
    }
    if args.force {
        settings = settings.set_override("force", true)?;
    }
    if args.verbose {
        settings = settings.set_override("log_filter", "debug")?;
    }

    let mut config: Config = settings.build()?.try_deserialize()?;
    // Paths are set after deserialization; an override would have to round-trip them through a
    // string.
    if let Some(ref input) = args.input {
        config.input = input.clone();
    }
    if let Some(ref output) = args.output {
        config.output = output.clone();
    }
    if config.input.as_os_str().is_empty() {
        return Err("no input dataset given".into());
    }
    Ok(config)
}

/// Returns the config file path, given the config directory.
fn config_file(config_dir: &Path) -> PathBuf {
    [config_dir, "fix.toml".as_ref()].iter().collect()
}
