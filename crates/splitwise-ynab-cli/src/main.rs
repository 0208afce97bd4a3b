use std::process::ExitCode;

fn main() -> anyhow::Result<ExitCode> {
    splitwise_ynab_cli::run(std::env::args())
}
