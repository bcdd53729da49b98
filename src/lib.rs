pub mod backup;
pub mod base;
pub mod blob;
pub mod cases;
pub mod error;
pub mod messages;
pub mod persistence;
pub mod prelude;
pub mod service;
pub mod settings;
mod utils;

pub use error::{Error, ErrorKind, Result};
