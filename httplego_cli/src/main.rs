use httplego_core::config::MessageConfig;
use httplego_core::input::Input;
use httplego_core::template::Template;

use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(short, long, value_parser)]
    config_file: Option<PathBuf>,
    /// Reassign a node before rendering, e.g. `--set "request line/uri/path=/admin"`.
    #[clap(long = "set", value_name = "PATH=VALUE")]
    overrides: Vec<String>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the serialized message and its MD5 fingerprint.
    Render {
        /// Write the raw bytes instead of an escaped, human-readable form.
        #[clap(long)]
        raw: bool,
    },
    /// List the nodes an engine may mutate.
    Targets {
        #[clap(long)]
        json: bool,
    },
}

fn load_config(config_file: Option<PathBuf>) -> Result<MessageConfig, anyhow::Error> {
    match config_file {
        Some(config_path) => {
            info!("Loading template from specified path: {config_path:?}");
            MessageConfig::load_from_file(&config_path)
        }
        None => {
            let default_config_path = PathBuf::from("template.toml");
            if default_config_path.exists() {
                info!("No template specified via CLI, loading default: {default_config_path:?}");
                MessageConfig::load_from_file(&default_config_path)
            } else {
                info!(
                    "No template specified and default 'template.toml' not found, using built-in demo message."
                );
                Ok(MessageConfig::default())
            }
        }
    }
}

fn apply_overrides(template: &mut Template, overrides: &[String]) -> Result<(), anyhow::Error> {
    for assignment in overrides {
        let (path, value) = assignment
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Override {assignment:?} is not of the form PATH=VALUE"))?;
        template
            .set_raw(path, value)
            .map_err(|e| anyhow::anyhow!("Failed to apply override {assignment:?}: {e}"))?;
        debug!(path, value, "applied override");
    }
    Ok(())
}

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config_file)?;
    debug!("Effective template definition: {config:#?}");

    let mut template = config
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build template: {e}"))?;
    apply_overrides(&mut template, &cli.overrides)?;

    match cli.command {
        Command::Render { raw } => {
            let payload = template.payload()?;
            let mut stdout = std::io::stdout().lock();
            if raw {
                stdout.write_all(payload.as_bytes())?;
            } else {
                writeln!(stdout, "{}", payload.as_bytes().escape_ascii())?;
            }
            stdout.flush()?;
            info!(
                bytes = payload.len(),
                md5 = %payload.digest_hex(),
                "rendered message"
            );
        }
        Command::Targets { json } => {
            let targets = template.mutation_targets();
            if json {
                println!("{}", serde_json::to_string_pretty(&targets)?);
            } else {
                for target in &targets {
                    println!("{:<10} {}", target.kind, target.path);
                }
            }
            info!(count = targets.len(), "listed mutation targets");
        }
    }
    Ok(())
}
