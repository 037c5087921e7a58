use std::process::ExitCode;

fn main() -> ExitCode {
    siteops_cli::run()
}
