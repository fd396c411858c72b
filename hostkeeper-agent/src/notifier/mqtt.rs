//! MQTT sink: publishes a JSON envelope per notification

use super::{MessageFormat, NotificationSink, OperatorId};
use crate::error::{MonitorError, MonitorResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info};

/// Envelope published on the notification topic
#[derive(Debug, Serialize)]
struct NotificationEnvelope<'a> {
    host: &'a str,
    operator_id: OperatorId,
    text: &'a str,
    format: MessageFormat,
    timestamp: DateTime<Utc>,
}

pub struct MqttSink {
    client: AsyncClient,
    topic: String,
    host: String,
}

impl MqttSink {
    /// Connect and keep the event loop running in the background
    pub fn connect(broker_host: &str, broker_port: u16, client_id: &str, topic: &str) -> Self {
        let mut mqtt_options = MqttOptions::new(client_id, broker_host, broker_port);
        mqtt_options.set_keep_alive(Duration::from_secs(30));
        mqtt_options.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(mqtt_options, 10);

        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                        info!("MQTT notification sink connected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("MQTT connection error: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });

        Self {
            client,
            topic: topic.to_string(),
            host: gethostname::gethostname().to_string_lossy().into_owned(),
        }
    }
}

#[async_trait]
impl NotificationSink for MqttSink {
    async fn notify(&self, operator: OperatorId, text: &str, format: MessageFormat) -> MonitorResult<()> {
        let envelope = NotificationEnvelope {
            host: &self.host,
            operator_id: operator,
            text,
            format,
            timestamp: Utc::now(),
        };
        let payload = serde_json::to_string(&envelope)
            .map_err(|e| MonitorError::NotificationDelivery(e.to_string()))?;

        // try_publish: a disconnected broker must not stall the cycle once the
        // request queue is full
        self.client
            .try_publish(&self.topic, QoS::AtLeastOnce, false, payload)
            .map_err(|e| MonitorError::NotificationDelivery(e.to_string()))?;

        debug!("Notification published on {}", self.topic);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mqtt"
    }
}
