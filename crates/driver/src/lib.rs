//! Keeper loops for the arbiter.
//!
//! Settling a challenged instance and aborting an instance whose deadline elapsed are moves that
//! anyone may make. The drivers in this crate make them on a schedule against a shared
//! [ComputeManager](arbiter_compute::ComputeManager), and dispatch the events the registry emits.

use anyhow::Result;
use async_trait::async_trait;

mod config;
pub use config::DriverConfig;

mod drivers;
pub use drivers::{DeadlineKeeperDriver, EventDispatchDriver};

pub mod handlers;

/// The [Driver] trait defines the interface for all driver loops that are ran by the `arbiter`
/// binary.
#[async_trait]
pub trait Driver {
    /// Starts the [Driver] loop.
    async fn start_loop(self) -> Result<()>;
}
