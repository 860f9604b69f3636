pub mod config;
pub mod error;
pub mod types;
pub mod vocabulary;

pub use config::RouterConfig;
pub use error::{QrError, Result};
pub use types::*;
