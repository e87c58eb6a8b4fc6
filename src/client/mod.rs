//! Places API client module.

mod places;
mod retry;
mod transport;

pub use places::*;
pub use retry::*;
pub use transport::*;
