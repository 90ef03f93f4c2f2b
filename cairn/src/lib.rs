// #![warn(rust_2018_idioms)]

pub mod driver;
pub mod ir;
pub mod pass;
pub mod reader;
pub mod reporting;
pub mod source;
pub mod symbol;

pub use driver::{Driver, Status};
