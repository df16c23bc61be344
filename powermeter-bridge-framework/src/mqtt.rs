//! MQTT broker client.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rumqttc::{
    AsyncClient, ClientError, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet,
    QoS,
};
use tokio::task::JoinHandle;

use crate::MqttConfig;
use crate::broker::Broker;
use crate::error::{BridgeError, Result};

/// Capacity of the request channel between client and event loop.
const REQUEST_CAPACITY: usize = 64;

/// Pause between reconnection attempts after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// MQTT broker backed by `rumqttc`.
///
/// The event loop runs on a background task that keeps reconnecting after
/// connection errors. Publishes are enqueued on the client without waiting
/// and flushed by that task. While the connection is down, or when the
/// request queue is full, publishes fail immediately.
#[derive(Debug)]
pub struct MqttBroker {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    driver: JoinHandle<()>,
}

impl MqttBroker {
    /// Connect to the broker described by `config`.
    ///
    /// Waits for the broker's CONNACK so that an unreachable broker or
    /// rejected credentials fail here instead of on the first publish.
    pub async fn connect(config: &MqttConfig) -> Result<Self> {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        options.set_clean_session(config.clean_session);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        let timeout = Duration::from_secs(config.connect_timeout_secs);
        tokio::time::timeout(timeout, wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| {
                BridgeError::MqttConnection(format!(
                    "no CONNACK from {}:{} within {:?}",
                    config.host, config.port, timeout
                ))
            })??;

        tracing::info!(host = %config.host, port = config.port, "Connected to MQTT broker");

        let connected = Arc::new(AtomicBool::new(true));
        let driver = tokio::spawn(drive(eventloop, Arc::clone(&connected)));

        Ok(Self {
            client,
            connected,
            driver,
        })
    }

    /// Whether the event loop currently holds an acknowledged connection.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Disconnect from the broker and stop the event loop.
    pub async fn disconnect(self) {
        if let Err(e) = self.client.try_disconnect() {
            tracing::warn!(error = %e, "Failed to request MQTT disconnect");
        }

        let mut driver = self.driver;
        if tokio::time::timeout(Duration::from_secs(1), &mut driver)
            .await
            .is_err()
        {
            driver.abort();
        }
    }
}

impl Broker for MqttBroker {
    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()> {
        if !self.is_connected() {
            return Err(BridgeError::publish(topic, "not connected to MQTT broker"));
        }

        self.client
            .try_publish(topic, QoS::AtMostOnce, retain, payload)
            .map_err(|e| match e {
                ClientError::TryRequest(_) => BridgeError::publish(topic, "request queue full"),
                e => BridgeError::publish(topic, e),
            })
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<()> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return match ack.code {
                    ConnectReturnCode::Success => Ok(()),
                    code => Err(BridgeError::MqttConnection(format!(
                        "connection refused: {:?}",
                        code
                    ))),
                };
            }
            Ok(_) => {}
            Err(e) => return Err(BridgeError::MqttConnection(e.to_string())),
        }
    }
}

async fn drive(mut eventloop: EventLoop, connected: Arc<AtomicBool>) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::debug!("MQTT disconnect sent");
                break;
            }
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    connected.store(true, Ordering::Release);
                    tracing::info!("Reconnected to MQTT broker");
                }
            }
            Ok(_) => {}
            Err(e) => {
                if connected.swap(false, Ordering::AcqRel) {
                    tracing::warn!(error = %e, "MQTT connection lost, reconnecting");
                } else {
                    tracing::debug!(error = %e, "MQTT reconnect failed");
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }

    connected.store(false, Ordering::Release);
}
