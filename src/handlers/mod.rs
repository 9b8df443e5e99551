pub mod calendar;
pub mod share;
