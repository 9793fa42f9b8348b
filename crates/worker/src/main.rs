//! Worker entry point.

use std::process::ExitCode;

use worker::Config;

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::from_env();
    worker::init_tracing(&config);

    match worker::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "worker stopped");
            ExitCode::FAILURE
        }
    }
}
