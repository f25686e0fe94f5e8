//! Tegra DisplayPort link bring-up.
//!
//! - [`aux`]: DPCD access with DEFER / NACK retries
//! - [`config`]: link configuration calculator and the lane/rate fallback ladder
//! - [`lt`]: link training state machine
//! - [`sor`]: SOR register sequencing
//! - [`output`]: display enable / disable path driving the trainer

#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[macro_use]
extern crate log;

pub use dp_if::dpcd;
pub use dp_if::host::{AuxChannel, AuxReply, AuxRequest, DpError, Hotplug, SorRegisters};
pub use dp_if::{DisplayMode, LinkRate, TrainingPattern};

pub mod aux;
pub mod calib;
pub mod config;
pub mod dp;
pub mod err;
pub mod lt;
pub mod osal;
pub mod output;
pub mod sor;
pub mod sync;

pub use config::LinkConfig;
pub use dp::{DpLink, DpPlatformData};
pub use lt::{LinkTrainer, LtState};
pub use osal::Kernel;
pub use output::DpOutput;
pub use sor::MmioSor;
