use crate::commands::{parse_switch_command, SwitchCommand};
use crate::config::Config;
use crate::messages::{MqttMessage, Topics};
use crate::panel::PanelClient;
use anyhow::Result;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use tokio::time::{sleep, Duration};

#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    pub async fn publish(&self, message: MqttMessage) -> Result<()> {
        self.client
            .publish(message.topic, QoS::AtLeastOnce, message.retain, message.payload)
            .await?;
        Ok(())
    }
}

pub fn connect(config: &Config) -> (MqttPublisher, EventLoop) {
    let mut mqttoptions = MqttOptions::new(
        config.mqtt_client_id.clone(),
        config.mqtt_host.clone(),
        config.mqtt_port,
    );
    mqttoptions.set_keep_alive(config.mqtt_keepalive());
    mqttoptions.set_clean_session(false);
    if let Some(username) = &config.mqtt_username {
        mqttoptions.set_credentials(
            username.clone(),
            config.mqtt_password.clone().unwrap_or_default(),
        );
    }

    let (client, eventloop) = AsyncClient::new(mqttoptions, 64);
    (MqttPublisher { client }, eventloop)
}

/// Drives the MQTT connection, re-subscribing to the switch command filter
/// on every (re)connect and forwarding inbound commands to the panel.
pub async fn run_event_loop(
    config: Config,
    publisher: MqttPublisher,
    mut eventloop: EventLoop,
    panel: PanelClient,
) -> Result<()> {
    let topics = Topics::new(&config.mqtt_discovery_prefix, &config.mqtt_topic_prefix);
    let command_filter = topics.command_filter();

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                tracing::info!(host = %config.mqtt_host, port = config.mqtt_port, "MQTT connected");
                // this task drains the request queue, so the subscribe must not await
                if let Err(err) = publisher
                    .client
                    .try_subscribe(command_filter.clone(), QoS::AtLeastOnce)
                {
                    tracing::warn!(error = %err, topic = %command_filter, "failed to subscribe to switch commands");
                } else {
                    tracing::info!(topic = %command_filter, "subscribed to switch commands");
                }
            }
            Ok(Event::Incoming(Incoming::Publish(publish))) => {
                tracing::info!(
                    topic = %publish.topic,
                    payload = %String::from_utf8_lossy(&publish.payload),
                    "received command message"
                );
                match parse_switch_command(&config.mqtt_topic_prefix, &publish.topic, &publish.payload) {
                    Ok(command) => {
                        let panel = panel.clone();
                        tokio::spawn(async move { forward_switch_command(&panel, command).await });
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, topic = %publish.topic, "ignoring command message");
                    }
                }
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(error = %err, "MQTT connection dropped; reconnecting");
                sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

async fn forward_switch_command(panel: &PanelClient, command: SwitchCommand) {
    let panel_id = command.panel_id();
    match panel.set_device_switch(&panel_id, command.state, None).await {
        Ok(message) => {
            tracing::info!(device_id = %panel_id, state = ?command.state, panel_message = %message, "switch command accepted");
        }
        Err(err) => {
            tracing::warn!(device_id = %panel_id, state = ?command.state, error = %err, "switch command failed");
        }
    }
}
