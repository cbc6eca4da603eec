use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use clap::Parser;
use snafu::{ResultExt, Snafu};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Compile a tiny C subset to x86-64 assembly.
#[derive(Debug, Parser)]
#[command(name = "g9cc", version, about)]
struct Cli {
  /// Program text to compile (the source itself, not a file path).
  source: String,

  /// Write assembly to PATH instead of stdout.
  #[arg(short, long, value_name = "PATH")]
  output: Option<PathBuf>,

  /// Raise log verbosity on stderr (-v debug, -vv trace).
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,
}

#[derive(Debug, Snafu)]
enum DriverError {
  #[snafu(display("{rendered}"))]
  Compile { rendered: String },

  #[snafu(display("cannot write assembly to {}: {source}", path.display()))]
  WriteFile { path: PathBuf, source: io::Error },

  #[snafu(display("cannot write assembly to stdout: {source}"))]
  WriteStdout { source: io::Error },
}

fn init_logging(verbose: u8) {
  let default = match verbose {
    0 => "warn",
    1 => "debug",
    _ => "trace",
  };
  let filter = EnvFilter::try_from_env("G9CC_LOG").unwrap_or_else(|_| EnvFilter::new(default));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(io::stderr)
    .with_target(false)
    .without_time()
    .init();
}

fn run(cli: &Cli) -> Result<(), DriverError> {
  let asm = g9cc::generate_assembly(&cli.source).map_err(|err| DriverError::Compile {
    rendered: err.render(&cli.source),
  })?;

  match &cli.output {
    Some(path) => {
      fs::write(path, &asm).context(WriteFileSnafu { path })?;
      debug!(path = %path.display(), "wrote assembly");
    }
    None => io::stdout()
      .lock()
      .write_all(asm.as_bytes())
      .context(WriteStdoutSnafu)?,
  }
  Ok(())
}

fn main() {
  let cli = match Cli::try_parse() {
    Ok(cli) => cli,
    // Usage errors exit with 1; --help and --version keep clap's behaviour.
    Err(err) if err.use_stderr() => {
      eprint!("{err}");
      process::exit(1);
    }
    Err(err) => err.exit(),
  };

  init_logging(cli.verbose);

  if let Err(err) = run(&cli) {
    eprintln!("{err}");
    process::exit(1);
  }
}
