use std::process::ExitCode;

fn main() -> ExitCode {
    splitsail::cli::run(std::env::args_os())
}
