//! Capacidade de publish/subscribe.
//!
//! O broker (durabilidade, QoS, roteamento) é externo. Aqui ficam os traits
//! que o pipeline consome, o casamento de tópicos no estilo MQTT e um broker
//! em memória baseado em `crossbeam-channel`.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

use crate::peripheral::TransportError;

/// Tópico onde o relay publica.
pub const DEFAULT_PUBLISH_TOPIC: &str = "iot/data";

/// Padrão que cobre todo o namespace de telemetria.
pub const DEFAULT_SUBSCRIBE_PATTERN: &str = "iot/#";

/// Mensagem recebida do broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Publicação fire-and-forget.
pub trait Publisher {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError>;
}

impl<P: Publisher + ?Sized> Publisher for &P {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        (**self).publish(topic, payload)
    }
}

/// Fonte de mensagens de uma assinatura.
pub trait Subscription {
    /// Espera até `timeout` pela próxima mensagem. `Ok(None)` = nada chegou.
    fn next_message(&mut self, timeout: Duration) -> Result<Option<Message>, TransportError>;
}

impl Subscription for Receiver<Message> {
    fn next_message(&mut self, timeout: Duration) -> Result<Option<Message>, TransportError> {
        match self.recv_timeout(timeout) {
            Ok(msg) => Ok(Some(msg)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Disconnected),
        }
    }
}

// ──────────────────────────────────────────────
// Tópicos
// ──────────────────────────────────────────────

/// Valida um padrão de assinatura (`+` ocupa um nível, `#` só no fim).
pub fn validate_pattern(pattern: &str) -> Result<(), TransportError> {
    if pattern.is_empty() {
        return Err(TransportError::InvalidTopic("padrão vazio".into()));
    }
    let levels: Vec<&str> = pattern.split('/').collect();
    for (i, level) in levels.iter().enumerate() {
        let wildcard_misused = (level.contains('#') && (*level != "#" || i + 1 != levels.len()))
            || (level.contains('+') && *level != "+");
        if wildcard_misused {
            return Err(TransportError::InvalidTopic(pattern.to_string()));
        }
    }
    Ok(())
}

/// Casamento de tópico MQTT. `iot/#` casa `iot`, `iot/data` e `iot/a/b`.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let mut pattern_levels = pattern.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (pattern_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(p), Some(t)) if p == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

// ──────────────────────────────────────────────
// Broker em memória
// ──────────────────────────────────────────────

#[derive(Debug)]
struct Route {
    pattern: String,
    tx: Sender<Message>,
}

/// Broker in-process. Assinantes que foram descartados saem da tabela
/// na próxima publicação.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    routes: Arc<Mutex<Vec<Route>>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, pattern: &str) -> Result<Receiver<Message>, TransportError> {
        validate_pattern(pattern)?;
        let (tx, rx) = unbounded();
        self.lock().push(Route {
            pattern: pattern.to_string(),
            tx,
        });
        Ok(rx)
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Route>> {
        self.routes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Publisher for MemoryBroker {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        if topic.is_empty() || topic.contains(['+', '#']) {
            return Err(TransportError::InvalidTopic(topic.to_string()));
        }

        let mut routes = self.lock();
        routes.retain(|route| {
            if !topic_matches(&route.pattern, topic) {
                return true;
            }
            let msg = Message {
                topic: topic.to_string(),
                payload: payload.to_vec(),
            };
            route.tx.send(msg).is_ok()
        });
        debug!("MEM publish {topic} ({} bytes)", payload.len());
        Ok(())
    }
}
