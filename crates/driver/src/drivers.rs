//! The `driver` module contains implementations of the [Driver] trait.

use crate::{handlers, Driver, DriverConfig};
use anyhow::Result;
use arbiter_compute::Event;
use async_trait::async_trait;
use std::sync::Arc;

/// Defines a new [Driver] implementation.
#[macro_export]
macro_rules! define_driver {
    ($name:ident, $inner:expr) => {
        #[doc = concat!("Variant of the [Driver] trait: [", stringify!($name), "]")]
        pub struct $name {
            /// The configuration for all of the drivers.
            pub config: Arc<DriverConfig>,
        }

        #[async_trait]
        impl Driver for $name {
            #[allow(clippy::redundant_closure_call)]
            async fn start_loop(self) -> Result<()> {
                $inner(self).await
            }
        }

        impl $name {
            #[doc = concat!("Creates a new instance of the [", stringify!($name), "] driver.")]
            pub fn new(config: Arc<DriverConfig>) -> Self {
                Self { config }
            }
        }
    };
}

define_driver!(
    EventDispatchDriver,
    (|driver: EventDispatchDriver| {
        async move {
            tracing::info!(target: "event-dispatch-driver", "Starting event dispatch driver...");
            let mut locked_receive_ch = driver.config.event_receiver.lock().await;
            tracing::info!(target: "event-dispatch-driver", "Locked receive channel mutex successfully. Beginning event dispatch loop.");

            while let Some(event) = locked_receive_ch.recv().await {
                match serde_json::to_string(&event) {
                    Ok(json) => tracing::info!(target: "event-dispatch-driver", "{}", json),
                    Err(e) => {
                        // Soft failure, log the error and continue.
                        tracing::error!(target: "event-dispatch-driver", "Error encoding event {:?}: {}", event, e);
                    }
                }

                if let Event::Finished { id, state } = event {
                    let manager = driver.config.manager.lock().await;
                    match manager.get_result(id) {
                        Ok(result) => {
                            tracing::info!(target: "event-dispatch-driver", "Instance {} finished in {}: ready={}, blame={:?}, output={:?}", id, state, result.ready, result.blame, result.output);
                        }
                        Err(e) => {
                            tracing::error!(target: "event-dispatch-driver", "Error reading result of instance {}: {}", id, e);
                        }
                    }
                }
            }

            tracing::info!(target: "event-dispatch-driver", "Event channel closed, stopping.");
            Ok::<(), anyhow::Error>(())
        }
    })
);

define_driver!(
    DeadlineKeeperDriver,
    (|driver: DeadlineKeeperDriver| {
        async move {
            tracing::info!(target: "deadline-keeper-driver", "Starting deadline keeper driver...");
            let sender = driver
                .config
                .event_sender
                .lock()
                .await
                .take()
                .ok_or(anyhow::anyhow!(
                    "Critical failure: event sender already taken by another keeper."
                ))?;

            let mut interval = tokio::time::interval(driver.config.poll_interval);
            loop {
                interval.tick().await;

                // Release the registry before dispatching, the dispatcher reads it too.
                let (events, active) = {
                    let mut manager = driver.config.manager.lock().await;
                    let (_, active) = handlers::keeper_pass(&mut manager);
                    (manager.drain_events(), active)
                };

                for event in events {
                    if let Err(e) = sender.send(event).await {
                        tracing::error!(target: "deadline-keeper-driver", "Error dispatching event: {}", e);
                    }
                }

                if driver.config.exit_when_settled && active == 0 {
                    tracing::info!(target: "deadline-keeper-driver", "No active instance left, stopping.");
                    break;
                }
            }

            Ok::<(), anyhow::Error>(())
        }
    })
);
