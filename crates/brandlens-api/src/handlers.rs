//! Request handlers.

pub mod analyze;
pub mod health;
pub mod runs;

pub use analyze::*;
pub use health::*;
pub use runs::*;
