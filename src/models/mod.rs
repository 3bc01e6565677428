pub mod health;
pub mod messages;
pub mod stats;
pub mod error;

pub use health::*;
pub use messages::*;
pub use stats::*;
pub use error::*;
