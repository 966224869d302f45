use clap::Parser;
use legacyconv::{convert_file, ConvertOptions};
use std::error::Error;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "legacyconv", about = "Convert a legacy server backup to the current backup format")]
struct Cli {
    /// Legacy backup to read
    input: PathBuf,
    /// Where to write the converted backup
    output: PathBuf,
    /// Password for encrypted backups
    password: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("info"))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli  = Cli::parse();
    let opts = ConvertOptions { password: cli.password };

    if let Err(e) = convert_file(&cli.input, &cli.output, &opts) {
        eprintln!("error: {e}");
        let mut source = e.source();
        while let Some(cause) = source {
            eprintln!("  caused by: {cause}");
            source = cause.source();
        }
        std::process::exit(1);
    }
    println!("Converted: {}", cli.output.display());
}
