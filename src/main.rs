use std::process::ExitCode;
use std::sync::Arc;

use log::error;

use config::LogcastConfig;
use runtime::DockerRuntime;
use web::AppState;

mod cli;
mod config;
mod logs;
mod memstats;
mod runtime;
mod web;

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize the logger
    env_logger::init();

    let config = match LogcastConfig::try_init() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Unable to load config: {err}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match DockerRuntime::connect(config.docker_host.as_deref()) {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Unable to connect to Docker: {err}");
            return ExitCode::FAILURE;
        }
    };

    let state = Arc::new(AppState {
        runtime: Arc::new(runtime),
        settings: config.stream_settings(),
    });

    if let Err(err) = web::serve(config.listen, state).await {
        error!("Server error: {}", err);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
