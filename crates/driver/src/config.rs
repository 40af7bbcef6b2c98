//! The `config` module contains the [DriverConfig].

use arbiter_compute::{ComputeManager, Event};
use std::{sync::Arc, time::Duration};
use tokio::sync::{mpsc, Mutex};

/// The [DriverConfig] struct contains the configuration for the [Driver](crate::Driver)
/// implementations.
pub struct DriverConfig {
    /// The registry shared by every driver. Holding the lock for a whole pass keeps every
    /// operation on an instance atomic.
    pub manager: Arc<Mutex<ComputeManager>>,
    /// How often the keeper revisits the registry.
    pub poll_interval: Duration,
    /// Stop the keeper once no instance is active anymore.
    pub exit_when_settled: bool,
    /// The sending handle of the MPSC channel used to dispatch events. Taken by the keeper when
    /// it starts, and dropped when it exits.
    pub event_sender: Mutex<Option<mpsc::Sender<Event>>>,
    /// The receiving handle of the MPSC channel used to dispatch events.
    pub event_receiver: Mutex<mpsc::Receiver<Event>>,
}

impl DriverConfig {
    /// Creates a new [DriverConfig] with the given configuration.
    pub fn new(
        manager: Arc<Mutex<ComputeManager>>,
        poll_interval: Duration,
        exit_when_settled: bool,
    ) -> Self {
        // Create a new MPSC channel for dispatching events from the keeper.
        let (event_sender, event_receiver) = mpsc::channel(128);

        Self {
            manager,
            poll_interval,
            exit_when_settled,
            event_sender: Mutex::new(Some(event_sender)),
            event_receiver: Mutex::new(event_receiver),
        }
    }
}
