pub mod cli;
pub mod error;
pub mod health;
pub mod logging;
pub mod reconciler;

pub use error::{Error, Result};
