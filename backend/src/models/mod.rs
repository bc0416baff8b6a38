//! Domain model shared by the analytics engines and the store backends.

pub mod depot;
pub mod interval;
pub mod macros;

pub use depot::*;
pub use interval::*;
