mod account;
mod analytics;
mod market;
mod money;
mod notification;
mod transaction;

pub use account::*;
pub use analytics::*;
pub use market::*;
pub use money::*;
pub use notification::*;
pub use transaction::*;
