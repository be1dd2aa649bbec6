use std::process;

use clap::Parser;

use treeburg::cli::Args;

fn main() {
    let args = Args::parse();
    match treeburg::run(args) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            process::exit(3);
        }
    }
}
