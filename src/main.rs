use amortize::cli::{run, Cli};
use clap::Parser;
use simple_logger::SimpleLogger;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    if let Err(e) = SimpleLogger::new().with_level(level).init() {
        eprintln!("cannot install logger: {}", e);
    }

    run(cli)
}

// verifies that types can implement the gated traits below
#[cfg(test)]
fn is_normal<T: Sized + Send + Sync + Unpin>() {}

#[test]
fn normal_types() {
    is_normal::<amortize::LedgerEntry>();
    is_normal::<amortize::Loan>();
    is_normal::<amortize::LoanTerms>();
}
