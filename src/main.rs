//! pxtrack - Command-line tool for pxls.space templates

use std::process::ExitCode;

use pxtrack::cli;

fn main() -> ExitCode {
    cli::run()
}
