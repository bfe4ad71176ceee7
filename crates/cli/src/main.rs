use std::process::ExitCode;

fn main() -> ExitCode {
    retail_cli::run()
}
