use std::net::SocketAddr;

use course_timetabler::config::SchedulerConfig;
use course_timetabler::server::{self, ADDR_ENV, DEFAULT_ADDR};
use log::error;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match SchedulerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}: {}", e.kind(), e);
            std::process::exit(1);
        }
    };

    let raw = std::env::var(ADDR_ENV).unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let addr: SocketAddr = match raw.parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Invalid {ADDR_ENV} '{raw}': {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = server::run_server(config, addr).await {
        error!("Server stopped: {e}");
        std::process::exit(1);
    }
}
