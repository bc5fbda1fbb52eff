//! Retained at-least-once MQTT publisher.
//!
//! Delivers the numeric state and the JSON attribute set as two retained
//! QoS 1 messages. The sequencing is mandatory: connect and await the
//! ConnAck before any publish, await both PubAcks, then disconnect and wait
//! for disconnect completion. Every exit path, including acknowledgement
//! timeouts, still attempts the disconnect.

use std::time::Duration;

use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::time::{Instant, timeout_at};
use url::Url;

use crate::core::attributes::UsageAttributes;
use crate::error::{Result, UsageError};

const KEEP_ALIVE: Duration = Duration::from_secs(20);

/// Time allowed for the disconnect handshake after the publish path has
/// finished (or failed).
const DISCONNECT_GRACE: Duration = Duration::from_secs(5);

/// Broker connection settings for one publish cycle.
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub url: String,
    pub username: String,
    pub password: String,
    pub client_id: String,
    pub state_topic: String,
    pub attributes_topic: String,
}

/// Format the numeric state payload: ASCII decimal with exactly two
/// fractional digits.
#[must_use]
pub fn state_payload(usage_gb: f64) -> String {
    format!("{usage_gb:.2}")
}

fn broker_options(settings: &MqttSettings) -> Result<MqttOptions> {
    let url = Url::parse(&settings.url).map_err(|e| UsageError::ConfigInvalid {
        key: "mqtt_url".to_string(),
        message: format!("failed to parse mqtt server url: {e}"),
    })?;

    match url.scheme() {
        "mqtt" | "tcp" => {}
        other => {
            return Err(UsageError::ConfigInvalid {
                key: "mqtt_url".to_string(),
                message: format!("unsupported scheme {other:?} (expected mqtt:// or tcp://)"),
            });
        }
    }

    let host = url.host_str().ok_or_else(|| UsageError::ConfigInvalid {
        key: "mqtt_url".to_string(),
        message: "mqtt server url has no host".to_string(),
    })?;
    let port = url.port().unwrap_or(1883);

    let mut options = MqttOptions::new(&settings.client_id, host, port);
    options.set_keep_alive(KEEP_ALIVE);
    options.set_clean_session(true);
    if !settings.username.is_empty() {
        options.set_credentials(&settings.username, &settings.password);
    }
    Ok(options)
}

/// Publish state and attributes as two retained QoS 1 messages.
///
/// `budget` bounds the connect/publish/acknowledge phase; the disconnect
/// handshake gets its own short grace period so cancellation of the publish
/// path still unwinds through a clean disconnect.
///
/// # Errors
///
/// Returns [`UsageError::MqttPublish`] when the connection cannot be
/// confirmed, either publish is rejected, or the acknowledgements do not
/// arrive within the budget. Partial success is surfaced as failure.
pub async fn publish(
    settings: &MqttSettings,
    usage_gb: f64,
    attributes: &UsageAttributes,
    budget: Duration,
) -> Result<()> {
    let options = broker_options(settings)?;
    let (client, mut eventloop) = AsyncClient::new(options, 10);

    let deadline = Instant::now() + budget;
    let result = publish_inner(settings, &client, &mut eventloop, usage_gb, attributes, deadline)
        .await;

    // Best-effort clean shutdown on every path.
    if client.disconnect().await.is_ok() {
        let drain_deadline = Instant::now() + DISCONNECT_GRACE;
        loop {
            match timeout_at(drain_deadline, eventloop.poll()).await {
                Ok(Ok(Event::Outgoing(Outgoing::Disconnect))) => {
                    tracing::debug!("mqtt: disconnect completed");
                    break;
                }
                Ok(Ok(_)) => {}
                Ok(Err(_)) | Err(_) => break,
            }
        }
    }

    result
}

async fn publish_inner(
    settings: &MqttSettings,
    client: &AsyncClient,
    eventloop: &mut EventLoop,
    usage_gb: f64,
    attributes: &UsageAttributes,
    deadline: Instant,
) -> Result<()> {
    await_connack(eventloop, deadline).await?;
    tracing::debug!(url = %settings.url, "mqtt: connected");

    client
        .publish(
            settings.state_topic.as_str(),
            QoS::AtLeastOnce,
            true,
            state_payload(usage_gb),
        )
        .await
        .map_err(|e| UsageError::MqttPublish(format!("failed to publish state: {e}")))?;

    let attrs = serde_json::to_vec(attributes)?;
    client
        .publish(settings.attributes_topic.as_str(), QoS::AtLeastOnce, true, attrs)
        .await
        .map_err(|e| UsageError::MqttPublish(format!("failed to publish attributes: {e}")))?;

    // Both messages are QoS 1: wait until the broker has acknowledged each.
    await_pubacks(eventloop, 2, deadline).await?;
    tracing::info!(
        state_topic = %settings.state_topic,
        attributes_topic = %settings.attributes_topic,
        "mqtt: published state and attributes"
    );
    Ok(())
}

async fn await_connack(eventloop: &mut EventLoop, deadline: Instant) -> Result<()> {
    loop {
        let event = timeout_at(deadline, eventloop.poll())
            .await
            .map_err(|_| UsageError::MqttPublish("timed out waiting for connack".to_string()))?
            .map_err(|e| UsageError::MqttPublish(format!("connection failed: {e}")))?;

        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                if ack.code == ConnectReturnCode::Success {
                    return Ok(());
                }
                return Err(UsageError::MqttPublish(format!(
                    "broker refused connection: {:?}",
                    ack.code
                )));
            }
            other => tracing::trace!(?other, "mqtt: event before connack"),
        }
    }
}

async fn await_pubacks(eventloop: &mut EventLoop, expected: usize, deadline: Instant) -> Result<()> {
    let mut acked = 0;
    while acked < expected {
        let event = timeout_at(deadline, eventloop.poll())
            .await
            .map_err(|_| {
                UsageError::MqttPublish(format!(
                    "timed out waiting for publish acknowledgement ({acked}/{expected} acked)"
                ))
            })?
            .map_err(|e| UsageError::MqttPublish(format!("connection lost during publish: {e}")))?;

        if let Event::Incoming(Packet::PubAck(_)) = event {
            acked += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(url: &str) -> MqttSettings {
        MqttSettings {
            url: url.to_string(),
            username: "ha".to_string(),
            password: "secret".to_string(),
            client_id: "xfinity-usage".to_string(),
            state_topic: "homeassistant/sensor/xfinity_internet/state".to_string(),
            attributes_topic: "homeassistant/sensor/xfinity_internet/attributes".to_string(),
        }
    }

    #[test]
    fn state_payload_has_two_fractional_digits() {
        assert_eq!(state_payload(842.168), "842.17");
        assert_eq!(state_payload(0.0), "0.00");
        assert_eq!(state_payload(1000.0), "1000.00");
    }

    #[test]
    fn broker_options_parse_url() {
        let options = broker_options(&settings("mqtt://broker.local:1884")).unwrap();
        assert_eq!(options.broker_address(), ("broker.local".to_string(), 1884));
    }

    #[test]
    fn broker_options_default_port() {
        let options = broker_options(&settings("tcp://broker.local")).unwrap();
        assert_eq!(options.broker_address().1, 1883);
    }

    #[test]
    fn broker_options_reject_bad_url() {
        assert!(matches!(
            broker_options(&settings("not a url")),
            Err(UsageError::ConfigInvalid { .. })
        ));
        assert!(matches!(
            broker_options(&settings("wss://broker.local")),
            Err(UsageError::ConfigInvalid { .. })
        ));
    }

    #[tokio::test]
    async fn publish_fails_fast_on_unreachable_broker() {
        // Port 1 is never a broker; the connection error must surface as an
        // MqttPublish failure within the budget.
        let result = super::publish(
            &settings("mqtt://127.0.0.1:1"),
            1.0,
            &test_attributes(),
            Duration::from_millis(500),
        )
        .await;
        assert!(matches!(result, Err(UsageError::MqttPublish(_))));
    }

    fn test_attributes() -> UsageAttributes {
        UsageAttributes {
            friendly_name: "Xfinity Usage".to_string(),
            unit_of_measurement: "GB".to_string(),
            device_class: "data_size".to_string(),
            state_class: "measurement".to_string(),
            icon: "mdi:wan".to_string(),
            start_date: "2024-05-01".to_string(),
            end_date: "2024-05-31".to_string(),
            days_remaining: 12,
            usage_remaining: 999,
            usage_estimated: 300.0,
            usage_daily_average: 10.0,
            allowable_usage: 1000,
            in_paid_overage: false,
            overage_charges: 0,
            overage_used: 0,
            maximum_overage_charge: 100,
            policy: "1.2 Terabyte Data Plan".to_string(),
        }
    }
}
