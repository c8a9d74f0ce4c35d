#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::device::{Device, DeviceId};
use crate::messages::{discovery_messages, update_messages, Generated, MqttMessage, Topics};
use crate::mqtt::MqttPublisher;
use crate::panel::{PanelClient, PanelError};
use crate::repository::DeviceRepository;
use std::collections::HashSet;
use tokio::time::MissedTickBehavior;

/// What one pass over a poll produced, in publish order.
#[derive(Debug, Default)]
pub struct TickOutcome {
    pub polled: usize,
    pub messages: Vec<MqttMessage>,
    pub new_devices: Vec<DeviceId>,
    pub changed_devices: usize,
    pub unsupported: Vec<DeviceId>,
    pub failed_messages: usize,
    pub pruned: Vec<DeviceId>,
}

pub struct Reconciler {
    repository: DeviceRepository,
    topics: Topics,
    prune_missing: bool,
}

impl Reconciler {
    pub fn new(topics: Topics, prune_missing: bool) -> Self {
        Self {
            repository: DeviceRepository::new(),
            topics,
            prune_missing,
        }
    }

    pub fn repository(&self) -> &DeviceRepository {
        &self.repository
    }

    /// Runs one poll through the repository. Discovery for a new device is
    /// queued before its first state update.
    pub fn reconcile(&mut self, devices: &[Device]) -> TickOutcome {
        let mut outcome = TickOutcome {
            polled: devices.len(),
            ..TickOutcome::default()
        };

        for device in devices {
            let id = device.identity();

            if self.repository.is_new_device(id) {
                outcome.new_devices.push(id.clone());
                let generated = discovery_messages(device, &self.topics);
                collect(&mut outcome, device, "discovery", generated);
            }

            if !self.repository.add_or_update(device) {
                continue;
            }
            outcome.changed_devices += 1;
            let stored = self.repository.get_device(id).unwrap_or(device);
            let generated = update_messages(stored, &self.topics);
            collect(&mut outcome, stored, "update", generated);
        }

        if self.prune_missing {
            let seen: HashSet<DeviceId> = devices.iter().map(|d| d.identity().clone()).collect();
            outcome.pruned = self.repository.prune_missing(&seen);
        }

        outcome
    }

    /// Reconciles a fetch result. A failed fetch is logged and leaves the
    /// repository untouched; the tick produces nothing.
    pub fn apply_fetch(&mut self, fetched: Result<Vec<Device>, PanelError>) -> Option<TickOutcome> {
        match fetched {
            Ok(devices) => Some(self.reconcile(&devices)),
            Err(err) => {
                tracing::warn!(error = %err, "failed to fetch devices from panel");
                None
            }
        }
    }

    fn log_outcome(&self, outcome: &TickOutcome) {
        if !outcome.new_devices.is_empty() || outcome.changed_devices > 0 {
            tracing::info!(
                polled = outcome.polled,
                known = self.repository.len(),
                new = outcome.new_devices.len(),
                changed = outcome.changed_devices,
                messages = outcome.messages.len(),
                unsupported = outcome.unsupported.len(),
                failed = outcome.failed_messages,
                "reconciled panel devices"
            );
        } else {
            tracing::debug!(polled = outcome.polled, "no device changes");
        }
        if !outcome.pruned.is_empty() {
            tracing::info!(pruned = ?outcome.pruned, "pruned devices missing from poll");
        }
        if outcome.polled == 0 {
            if self.repository.is_empty() {
                tracing::debug!("panel reported no devices");
            } else {
                tracing::warn!(
                    known = self.repository.len(),
                    "panel reported no devices; keeping known devices"
                );
            }
        }
    }
}

fn collect(outcome: &mut TickOutcome, device: &Device, purpose: &'static str, generated: Generated) {
    match generated {
        Generated::Messages(results) => {
            for result in results {
                match result {
                    Ok(message) => outcome.messages.push(message),
                    Err(err) => {
                        outcome.failed_messages += 1;
                        tracing::warn!(
                            device_id = %device.identity(),
                            purpose,
                            error = %err,
                            "failed to build MQTT message"
                        );
                    }
                }
            }
        }
        Generated::Unsupported => {
            if !outcome.unsupported.contains(device.identity()) {
                outcome.unsupported.push(device.identity().clone());
            }
            tracing::info!(
                device_id = %device.identity(),
                device_type = %device.classification(),
                name = %device.name(),
                purpose,
                "unsupported device type; no messages generated"
            );
        }
    }
}

/// Poll loop: fetch, reconcile, publish. Failed fetches skip the tick.
pub async fn run(config: Config, panel: PanelClient, publisher: MqttPublisher) {
    let topics = Topics::new(&config.mqtt_discovery_prefix, &config.mqtt_topic_prefix);
    let mut reconciler = Reconciler::new(topics, config.prune_missing_devices);

    let mut ticker = tokio::time::interval(config.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let Some(outcome) = reconciler.apply_fetch(panel.fetch_devices().await) else {
            continue;
        };
        reconciler.log_outcome(&outcome);

        for message in outcome.messages {
            let topic = message.topic.clone();
            tracing::debug!(topic = %topic, payload = %String::from_utf8_lossy(&message.payload), "publishing");
            if let Err(err) = publisher.publish(message).await {
                tracing::warn!(error = %err, topic = %topic, "failed to publish MQTT message");
            }
        }
    }
}
