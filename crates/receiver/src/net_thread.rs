//! Thread de rede que escuta o broker MQTT e envia mensagens para o relay
//! via channel.

use crossbeam_channel::{Receiver, Sender, bounded};
use rumqttc::{Client, Connection, Event, MqttOptions, Packet, QoS};
use sensortag_core::channel::{Message, topic_matches, validate_pattern};
use sensortag_core::config::BrokerConfig;
use sensortag_core::peripheral::TransportError;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Espera entre tentativas de reconexão.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Inicia a thread de rede. Retorna o receiver do channel.
///
/// A thread vive enquanto o processo viver: reconecta sozinha e refaz a
/// assinatura a cada `ConnAck`.
pub fn spawn_subscription_thread(
    config: &BrokerConfig,
    client_id: &str,
    pattern: &str,
    capacity: usize,
) -> Result<Receiver<Message>, TransportError> {
    validate_pattern(pattern)?;

    let (tx, rx) = bounded::<Message>(capacity);

    let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
    if !config.username.is_empty() {
        options.set_credentials(config.username.clone(), config.password.clone());
    }
    let (client, connection) = Client::new(options, config.request_capacity);

    let broker = format!("{}:{}", config.host, config.port);
    let pattern = pattern.to_string();

    std::thread::Builder::new()
        .name("mqtt-receiver".into())
        .spawn(move || {
            receiver_loop(&tx, &client, connection, &broker, &pattern);
        })
        .map_err(|e| TransportError::Broker(e.to_string()))?;

    Ok(rx)
}

fn receiver_loop(tx: &Sender<Message>, client: &Client, mut connection: Connection, broker: &str, pattern: &str) {
    for event in connection.iter() {
        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("Conectado ao broker {broker} – assinando {pattern}");
                if let Err(e) = client.try_subscribe(pattern, QoS::AtMostOnce) {
                    error!("Falha ao assinar {pattern}: {e}");
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if !topic_matches(pattern, &publish.topic) {
                    debug!("Ignorando mensagem em {} (padrão {pattern})", publish.topic);
                    continue;
                }
                let msg = Message {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                };
                // Send bloqueante: relay lento segura o event loop em vez de perder leituras
                if tx.send(msg).is_err() {
                    info!("Relay encerrado, thread de rede saindo");
                    return;
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Conexão com {broker} falhou: {e}. Tentando novamente em 2s...");
                std::thread::sleep(RECONNECT_DELAY);
            }
        }
    }
}
