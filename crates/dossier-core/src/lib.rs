pub mod config;
pub mod ctx;
pub mod error;
pub mod types;

pub use config::DossierConfig;
pub use ctx::Ctx;
pub use error::{DossierError, Result};
pub use types::*;
