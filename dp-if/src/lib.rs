#![no_std]

extern crate alloc;

pub mod dpcd;
pub mod err;
pub mod host;
pub mod mode;

pub use dpcd::{LinkRate, TrainingPattern};
pub use mode::DisplayMode;
