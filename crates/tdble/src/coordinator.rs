//! Periodic polling of one device.
//!
//! The coordinator sits between a scheduler and the [`DeviceUpdater`]: it locates the device,
//! runs the first refresh with the discovery attempt cap, then polls on an interval with the
//! steady-state cap. The latest state is published on a `watch` channel. A failed poll marks
//! the device unavailable but keeps the last good snapshot.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::config::DeviceConfig;
use crate::device::DeviceSnapshot;
use crate::device::DeviceUpdater;
use crate::device::Transport;
use crate::device::UpdateError;

/// What consumers see of the device.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PollState {
    /// Whether the last poll succeeded
    pub available: bool,

    /// Last successful snapshot, kept across failed polls
    pub snapshot: Option<DeviceSnapshot>,

    pub last_error: Option<String>,
}

pub struct Coordinator<T: Transport> {
    address: String,
    updater: DeviceUpdater<T>,
    device: Option<T::Device>,
    update_interval: Duration,
    steady_max_attempts: u32,
    /// Set once the device has answered, switching to the steady-state attempt cap
    reachable: bool,
    state: watch::Sender<PollState>,
}

impl<T: Transport> Coordinator<T> {
    pub fn new(
        transport: T,
        address: impl Into<String>,
        config: &DeviceConfig,
    ) -> (Self, watch::Receiver<PollState>) {
        let (state, rx) = watch::channel(PollState::default());
        let coordinator = Self {
            address: address.into(),
            updater: DeviceUpdater::new(transport, config.discovery_options()),
            device: None,
            update_interval: config.update_interval(),
            steady_max_attempts: config.max_attempts,
            reachable: false,
            state,
        };
        (coordinator, rx)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Close leftover connections and look the device up.
    pub async fn setup(&mut self) -> Result<(), UpdateError> {
        info!("Setting up coordinator for {}", self.address);
        self.updater.transport().close_stale(&self.address).await?;
        self.device = Some(self.locate().await?);
        Ok(())
    }

    /// First poll after setup, with the discovery attempt cap.
    ///
    /// On success the steady-state cap applies from then on.
    pub async fn first_refresh(&mut self) -> Result<DeviceSnapshot, UpdateError> {
        let snapshot = self.refresh().await?;
        self.reachable = true;
        self.updater.set_max_attempts(self.steady_max_attempts);
        info!(
            "{} is reachable, allowing {} attempt(s) per update",
            snapshot.display_name(),
            self.steady_max_attempts
        );
        Ok(snapshot)
    }

    /// Poll once, through [`Self::first_refresh`] until the device has answered.
    pub async fn update(&mut self) -> Result<DeviceSnapshot, UpdateError> {
        if self.reachable {
            self.refresh().await
        } else {
            self.first_refresh().await
        }
    }

    /// Poll the device once and publish the outcome.
    pub async fn refresh(&mut self) -> Result<DeviceSnapshot, UpdateError> {
        let result = self.poll().await;
        match &result {
            Ok(snapshot) => {
                self.state.send_replace(PollState {
                    available: true,
                    snapshot: Some(snapshot.clone()),
                    last_error: None,
                });
            }
            Err(e) => {
                error!("Unable to fetch data from {}: {}", self.address, e);
                self.state.send_modify(|state| {
                    state.available = false;
                    state.last_error = Some(e.to_string());
                });
            }
        }
        result
    }

    /// Poll on the configured interval until `shutdown` completes, then disconnect.
    ///
    /// An update still in flight when `shutdown` completes is abandoned.
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.update_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the caller has already polled once
        ticker.tick().await;

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                _ = &mut shutdown => break,
                // Failures are published on the state channel
                _ = self.update() => {}
            }
        }

        self.shutdown().await;
    }

    pub async fn shutdown(&mut self) {
        info!("Disconnecting from {}", self.address);
        self.updater.disconnect(&self.address).await;
        // An abandoned update may have connected without handing over a session
        if let Err(e) = self.updater.transport().close_stale(&self.address).await {
            warn!("Unable to close connection to {}: {}", self.address, e);
        }
    }

    async fn poll(&mut self) -> Result<DeviceSnapshot, UpdateError> {
        if self.device.is_none() {
            warn!("No handle for {}, looking it up again", self.address);
            self.device = Some(self.locate().await?);
        }
        let Some(device) = self.device.as_ref() else {
            return Err(UpdateError::NotReady(self.address.clone()));
        };
        self.updater.update_device(device).await
    }

    async fn locate(&self) -> Result<T::Device, UpdateError> {
        match self.updater.transport().locate(&self.address).await? {
            Some(device) => Ok(device),
            None => {
                error!("Could not find device with address {}", self.address);
                Err(UpdateError::NotReady(self.address.clone()))
            }
        }
    }
}
