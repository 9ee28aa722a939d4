pub mod schema;

pub use schema::{AuthConfig, Config, Environment, GatewayConfig, StorageConfig};
