// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One consumer per channel, polled concurrently.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use engyne_config::model::DispatcherConfig;
use engyne_core::{Channel, ChannelSender, Clock, EngyneError};
use engyne_storage::{RuntimeStore, SlotStore};
use strum::IntoEnumIterator;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::channel::{ChannelDispatcher, ChannelStatus, DispatchSettings, TickReport};
use crate::sender::senders_from_config;

pub struct Dispatcher {
    channels: BTreeMap<Channel, Arc<Mutex<ChannelDispatcher>>>,
    poll_interval: Duration,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("channels", &self.channels.keys().collect::<Vec<_>>())
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl Dispatcher {
    /// A consumer for every channel. Channels missing from `senders` block
    /// their items as `missing_webhook`.
    pub fn new(
        runtime: RuntimeStore,
        slots: SlotStore,
        senders: HashMap<Channel, Arc<dyn ChannelSender>>,
        config: &DispatcherConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngyneError> {
        let settings = DispatchSettings::from_config(config);
        let mut channels = BTreeMap::new();
        for channel in Channel::iter() {
            let consumer = ChannelDispatcher::new(
                channel,
                runtime.clone(),
                slots.clone(),
                senders.get(&channel).cloned(),
                settings.clone(),
                clock.clone(),
            )?;
            channels.insert(channel, Arc::new(Mutex::new(consumer)));
        }
        Ok(Self {
            channels,
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
        })
    }

    /// Build with webhook senders from `config`.
    pub fn from_config(
        runtime: RuntimeStore,
        slots: SlotStore,
        config: &DispatcherConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngyneError> {
        let senders = senders_from_config(config)?;
        Self::new(runtime, slots, senders, config, clock)
    }

    fn consumer(&self, channel: Channel) -> Result<&Arc<Mutex<ChannelDispatcher>>, EngyneError> {
        self.channels
            .get(&channel)
            .ok_or_else(|| EngyneError::Internal(format!("no consumer for {channel}")))
    }

    /// One tick on every channel, channels running concurrently.
    pub async fn tick_all(&self) -> BTreeMap<Channel, Result<TickReport, EngyneError>> {
        let mut set = JoinSet::new();
        for (channel, consumer) in &self.channels {
            let (channel, consumer) = (*channel, consumer.clone());
            set.spawn(async move { (channel, consumer.lock().await.tick().await) });
        }
        let mut reports = BTreeMap::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((channel, report)) => {
                    reports.insert(channel, report);
                }
                Err(e) => error!(error = %e, "dispatch tick task failed"),
            }
        }
        reports
    }

    /// Poll every channel on its own task until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(interval = ?self.poll_interval, "dispatcher started");
        let mut set = JoinSet::new();
        for (channel, consumer) in &self.channels {
            let (channel, consumer) = (*channel, consumer.clone());
            let cancel = cancel.clone();
            let period = self.poll_interval;
            set.spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = interval.tick() => {
                            if let Err(e) = consumer.lock().await.tick().await {
                                error!(channel = %channel, error = %e, "dispatch tick failed");
                            }
                        }
                    }
                }
            });
        }
        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "dispatch task ended abnormally");
            }
        }
        info!("dispatcher stopped");
    }

    pub async fn status(&self) -> Result<Vec<ChannelStatus>, EngyneError> {
        let mut out = Vec::with_capacity(self.channels.len());
        for consumer in self.channels.values() {
            out.push(consumer.lock().await.status()?);
        }
        Ok(out)
    }

    /// Give up on the head item of `channel`.
    pub async fn abandon(&self, channel: Channel) -> Result<Option<u64>, EngyneError> {
        self.consumer(channel)?.lock().await.abandon()
    }
}
