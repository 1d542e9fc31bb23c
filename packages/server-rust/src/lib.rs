//! Saturn gateway server: caller identification, persisted per-caller rate
//! limiting, and upstream credential rotation in front of calendar and
//! contact endpoints.

pub mod cli;
pub mod network;
pub mod render;
pub mod service;
pub mod startup;
pub mod storage;
pub mod telemetry;
pub mod token;
pub mod upstream;

pub use cli::Cli;
pub use network::{build_router, AppState, NetworkModule};
pub use startup::{initialize, StartupError};
pub use storage::{DocumentStore, StoreError};
pub use upstream::{TokenRefreshHandler, UpstreamSession};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
