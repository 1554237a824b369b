pub mod application;
pub mod cli;
pub mod client;
pub mod clock;
pub mod config;
pub mod domain;
pub mod storage;

pub use application::{AppError, Gateway};
pub use domain::*;
pub use storage::LedgerStore;
