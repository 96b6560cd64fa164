use abi_decoder::cmds;
use abi_decoder::cmds::codegen::IrOutputFormat;
use abi_decoder::codegen::shared::builder::DecoderOptions;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "abi-decoder")]
#[command(about = "Synthesizes calldata-to-memory ABI decoders", long_about = None)]
struct Cli {
    /// Enable verbose output and debug logging
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize decoder plans and write the decoder IR
    Codegen {
        /// Type files (YAML/JSON) or Solidity JSON ABIs
        #[arg(short = 'f', long = "files", value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Only generate decoders for these types or functions
        #[arg(short = 't', long = "type", value_name = "NAME")]
        types: Vec<String>,

        /// Validate every dynamic offset against its canonical value
        #[arg(long = "strict")]
        strict: bool,

        /// Keep copies exactly as synthesized
        #[arg(long = "no-merge")]
        no_merge: bool,

        /// Output format for the decoder IR
        #[arg(long = "format", value_enum, default_value = "json")]
        format: OutputFormat,

        /// Output file (stdout when omitted)
        #[arg(short = 'o', long = "output", value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Show layouts and structural predicates for each type
    Analyze {
        /// Type files (YAML/JSON) or Solidity JSON ABIs
        #[arg(short = 'f', long = "files", value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Only analyze these types or functions
        #[arg(short = 't', long = "type", value_name = "NAME")]
        types: Vec<String>,

        /// Print the report as JSON
        #[arg(long = "json")]
        json: bool,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
enum OutputFormat {
    /// Pretty-printed JSON
    Json,
    /// Protobuf-encoded bytes
    Protobuf,
    /// Human-readable plan listing
    Listing,
}

impl From<OutputFormat> for IrOutputFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => IrOutputFormat::Json,
            OutputFormat::Protobuf => IrOutputFormat::Protobuf,
            OutputFormat::Listing => IrOutputFormat::Listing,
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Codegen {
            files,
            types,
            strict,
            no_merge,
            format,
            output,
        } => {
            let options = DecoderOptions {
                strict,
                merge_copies: !no_merge,
            };
            cmds::codegen::run(files, types, options, format.into(), output, cli.verbose)?;
        }

        Commands::Analyze { files, types, json } => {
            cmds::analyze::run(files, types, json, cli.verbose)?;
        }
    }

    Ok(())
}
