use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    freezeomatic::cli::main().await
}
