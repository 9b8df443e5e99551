pub mod calendar;
pub mod pet;
pub mod share;

pub use calendar::*;
pub use pet::*;
pub use share::*;
