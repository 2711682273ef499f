//! nsketch command-line binary

use nsketch::cli::Cli;
use nsketch::CompilerError;
use std::process;

fn main() {
    let mut cli = Cli::new();
    match cli.run() {
        Ok(()) => {}
        Err(CompilerError::Io(e)) => {
            eprintln!("IO Error: {}", e);
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
