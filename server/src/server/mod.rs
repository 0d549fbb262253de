mod assignment;
mod peers;
mod registry;
mod server;
mod server_config;
mod stats;

pub use server::Server;
pub use server_config::ServerConfig;
pub use stats::{ConnectionDetail, LevelStats, OfflineReport, PoolStats};
