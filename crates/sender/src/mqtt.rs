//! Publicação MQTT via `rumqttc`.
//!
//! O cliente síncrono só envia pacotes enquanto a `Connection` é iterada,
//! então o event loop roda numa thread dedicada que apenas drena e loga
//! eventos. Reconexão é automática: a iteração continua após um erro.

use rumqttc::{Client, ClientError, Event, MqttOptions, Packet, QoS};
use sensortag_core::channel::Publisher;
use sensortag_core::config::BrokerConfig;
use sensortag_core::peripheral::TransportError;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Espera entre tentativas de reconexão.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Publicador MQTT QoS 0 (fire-and-forget).
///
/// Nunca bloqueia: com o broker fora do ar a fila de requisições do
/// cliente enche e `publish` devolve erro na hora.
pub struct MqttPublisher {
    client: Client,
}

impl MqttPublisher {
    pub fn connect(config: &BrokerConfig, client_id: &str) -> Result<Self, TransportError> {
        let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
        if !config.username.is_empty() {
            options.set_credentials(config.username.clone(), config.password.clone());
        }

        let (client, mut connection) = Client::new(options, config.request_capacity);
        let broker = format!("{}:{}", config.host, config.port);

        std::thread::Builder::new()
            .name("mqtt-publisher".into())
            .spawn(move || {
                for event in connection.iter() {
                    match event {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            info!("Conectado ao broker {broker}");
                        }
                        Ok(event) => debug!("MQTT {event:?}"),
                        Err(e) => {
                            warn!("Conexão com {broker} falhou: {e}. Tentando novamente em 2s...");
                            std::thread::sleep(RECONNECT_DELAY);
                        }
                    }
                }
            })
            .map_err(|e| TransportError::Broker(e.to_string()))?;

        Ok(Self { client })
    }
}

impl Publisher for MqttPublisher {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload.to_vec())
            .map_err(|e| match e {
                ClientError::TryRequest(_) => {
                    TransportError::Broker(format!("fila MQTT cheia, mensagem em {topic} descartada"))
                }
                other => TransportError::Broker(other.to_string()),
            })
    }
}
