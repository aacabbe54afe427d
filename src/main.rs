use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use llm_ocr_rust::{Command, Config, OutputFormat};

#[derive(Parser, Debug)]
#[command(
    name = "llm-ocr-rust",
    version,
    about = "Transcribe images with an LLM and repair the stream as it arrives"
)]
struct Cli {
    /// Model name or provider:model (e.g. gemini:gemini-2.5-flash)
    #[arg(short = 'm', long = "model", global = true)]
    model: Option<String>,

    /// API key (overrides environment variables)
    #[arg(short = 'k', long = "key", global = true)]
    key: Option<String>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings", global = true)]
    read_settings: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Run the streaming relay (POST /api/recognize)
    Serve {
        /// Listen address (overrides [server].addr)
        #[arg(short = 'a', long = "addr")]
        addr: Option<String>,
    },
    /// Transcribe image files
    Transcribe {
        /// Image files to transcribe
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Send images through a running relay instead of calling the provider
        #[arg(long = "relay")]
        relay: Option<String>,

        /// Subject of the images (e.g. "handwritten lab notes")
        #[arg(short = 'D', long = "domain")]
        domain: Option<String>,

        /// Output format
        #[arg(short = 'f', long = "format", value_enum, default_value = "markdown")]
        format: OutputFormat,

        /// Maximum concurrent transcriptions (overrides [scheduler].max_concurrent)
        #[arg(short = 'j', long = "jobs")]
        jobs: Option<usize>,
    },
    /// Normalize structured text from stdin
    Normalize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let serving = matches!(cli.command, CliCommand::Serve { .. });
    llm_ocr_rust::logging::init(cli.verbose, serving)?;

    let command = match cli.command {
        CliCommand::Serve { addr } => Command::Serve { addr },
        CliCommand::Transcribe {
            files,
            relay,
            domain,
            format,
            jobs,
        } => Command::Transcribe {
            files,
            relay,
            domain,
            format,
            jobs,
        },
        CliCommand::Normalize => {
            if io::stdin().is_terminal() {
                return Err(anyhow!("normalize reads text from stdin"));
            }
            let mut input = String::new();
            io::stdin()
                .read_to_string(&mut input)
                .map_err(|err| anyhow!("stdin must be UTF-8 text: {}", err))?;
            Command::Normalize { input }
        }
    };

    let output = llm_ocr_rust::run(Config {
        model: cli.model,
        key: cli.key,
        settings_path: cli.read_settings,
        command,
    })
    .await?;

    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}
