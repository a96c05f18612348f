use std::process::ExitCode;

fn main() -> ExitCode {
    recfm_cli::run()
}
