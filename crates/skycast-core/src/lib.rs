pub mod config;
pub mod error;
pub mod types;

pub use config::SkycastConfig;
pub use error::{Result, SkycastError};
pub use types::*;
