//! plugsync binary

// Fatal errors are rendered with miette before logging may be available
#![allow(clippy::print_stderr)]

use clap::Parser;
use miette::Report;
use plugsync::{Cli, EXIT_FATAL, logging};
use tracing::error;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.log_format) {
        eprintln!("{:?}", Report::new(e));
        std::process::exit(EXIT_FATAL);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Fatal error: Failed to create tokio runtime: {e}");
            std::process::exit(EXIT_FATAL);
        }
    };

    let code = match runtime.block_on(plugsync::run(&cli)) {
        Ok(report) => cli.exit_code(&report),
        Err(e) => {
            error!(error = %e, "Plugin sync aborted");
            eprintln!("{:?}", Report::new(e));
            EXIT_FATAL
        }
    };

    std::process::exit(code);
}
