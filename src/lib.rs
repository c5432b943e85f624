use config::Config;

pub mod config;
pub mod middleware;
pub mod schedule;
pub mod utils;

pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
}
