//! Source location tracking shared by all compiler stages.

mod location;
mod span;

pub use location::{Located, Location};
pub use span::Span;
