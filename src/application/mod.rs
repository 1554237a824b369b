// Application layer: validation, orchestration and the gateway callers use.

pub mod analytics;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod market;
pub mod notification;
pub mod reporting;
pub mod wallet;

pub use analytics::*;
pub use engine::*;
pub use error::*;
pub use gateway::*;
pub use market::*;
pub use notification::*;
pub use reporting::*;
pub use wallet::*;
