pub mod backend;
pub mod config;
pub mod error;
pub mod keys;
pub mod logging;
pub mod models;
pub mod relay;
pub mod server;
pub mod translate;

pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use keys::KeyStore;
pub use logging::SharedLogger;
pub use models::ModelTable;
pub use server::{build_router, AppState};
