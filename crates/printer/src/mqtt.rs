//! One-shot MQTT/TLS command publisher.
//!
//! Each call opens a fresh session to the printer's broker, publishes a
//! single request, lets the event loop flush it, and disconnects. No
//! subscription is made; the printer's acknowledgement arrives through the
//! telemetry listener.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{
    AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, TlsConfiguration, Transport,
};
use rustls::ClientConfig;

use crate::commander::CommandError;
use crate::commands::{request_topic, PrintRequest};
use crate::{CONNACK_TIMEOUT, MQTT_PORT, PRINTER_USERNAME, PUBLISH_LINGER};

/// Bound on waiting for our DISCONNECT to leave the socket.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Request channel capacity; only one publish and one disconnect are queued.
const REQUEST_CAPACITY: usize = 4;

/// Publish `request` to `device/{serial}/request` on the printer at `ip`.
pub async fn publish_command(
    ip: &str,
    serial: &str,
    access_code: &str,
    request: &PrintRequest,
    tls: Arc<ClientConfig>,
) -> Result<(), CommandError> {
    let payload = serde_json::to_vec(request)?;

    let mut options = MqttOptions::new(format!("commander_{serial}"), ip, MQTT_PORT);
    options
        .set_credentials(PRINTER_USERNAME, access_code)
        .set_keep_alive(Duration::from_secs(30))
        .set_clean_session(true)
        .set_transport(Transport::tls_with_config(TlsConfiguration::Rustls(tls)));

    let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

    wait_for_connack(&mut eventloop).await?;
    tracing::debug!(serial, ip, "MQTT session established");

    client
        .publish(request_topic(serial), QoS::AtMostOnce, false, payload)
        .await
        .map_err(|e| CommandError::Mqtt(e.to_string()))?;

    let delivered = linger(&mut eventloop).await?;

    disconnect(&client, &mut eventloop).await;

    if !delivered {
        return Err(CommandError::NotDelivered);
    }
    tracing::debug!(serial, "print command published");
    Ok(())
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), CommandError> {
    let connected = tokio::time::timeout(CONNACK_TIMEOUT, async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
                Ok(_) => {}
                Err(e) => return Err(CommandError::Mqtt(e.to_string())),
            }
        }
    })
    .await;

    match connected {
        Ok(result) => result,
        Err(_) => Err(CommandError::ConnectionTimeout),
    }
}

/// Drive the event loop for [`PUBLISH_LINGER`] so the queued publish is
/// written out. Returns whether the publish left the client.
async fn linger(eventloop: &mut EventLoop) -> Result<bool, CommandError> {
    let mut delivered = false;
    let deadline = tokio::time::sleep(PUBLISH_LINGER);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = eventloop.poll() => match event {
                Ok(Event::Outgoing(Outgoing::Publish(_))) => delivered = true,
                Ok(_) => {}
                Err(e) if delivered => {
                    tracing::debug!(error = %e, "MQTT session ended after publish");
                    break;
                }
                Err(e) => return Err(CommandError::Mqtt(e.to_string())),
            },
        }
    }

    Ok(delivered)
}

/// Best-effort clean disconnect.
async fn disconnect(client: &AsyncClient, eventloop: &mut EventLoop) {
    if let Err(e) = client.disconnect().await {
        tracing::debug!(error = %e, "MQTT disconnect request failed");
        return;
    }

    let flushed = tokio::time::timeout(DISCONNECT_TIMEOUT, async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    })
    .await;

    if flushed.is_err() {
        tracing::debug!("MQTT disconnect not flushed in time");
    }
}
