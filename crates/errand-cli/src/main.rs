use std::io;
use std::process::ExitCode;

use clap::Parser;

use errand_cli::{exit_status, run, Args};

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args, &mut io::stdout()) {
        Ok(code) => ExitCode::from(exit_status(code)),
        Err(error) => {
            eprintln!("errand: {error}");
            ExitCode::FAILURE
        }
    }
}
