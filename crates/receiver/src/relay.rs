//! Relay do lado do Receiver: mensagem do broker → validação → sink.
//!
//! Nenhum erro atravessa [`RelaySubscriber::handle_message`]: mensagem
//! inválida é descartada, falha de persistência é logada e o stream segue.
//! Não há retry nem dead-letter do registro que falhou.

use sensortag_core::channel::{Message, Subscription};
use sensortag_core::clock::CancelToken;
use sensortag_core::peripheral::TransportError;
use sensortag_core::protocol::{MessageFormatError, decode_reading};
use sensortag_core::storage::{Ack, PersistenceError, StorageSink};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Resultado do processamento de uma mensagem.
#[derive(Debug)]
pub enum MessageOutcome {
    Stored(Ack),
    Skipped(MessageFormatError),
    PersistFailed(PersistenceError),
}

/// Contadores do loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub received: u64,
    pub stored: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl RelayStats {
    fn record(&mut self, outcome: &MessageOutcome) {
        self.received += 1;
        match outcome {
            MessageOutcome::Stored(_) => self.stored += 1,
            MessageOutcome::Skipped(_) => self.skipped += 1,
            MessageOutcome::PersistFailed(_) => self.failed += 1,
        }
    }
}

/// Consome mensagens e persiste leituras válidas.
pub struct RelaySubscriber<S> {
    sink: S,
    stats: RelayStats,
}

impl<S: StorageSink> RelaySubscriber<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            stats: RelayStats::default(),
        }
    }

    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Processa uma mensagem. Nunca falha: o resultado diz o que aconteceu.
    pub fn handle_message(&mut self, topic: &str, payload: &[u8]) -> MessageOutcome {
        let outcome = match decode_reading(payload) {
            Err(e) => {
                warn!("Mensagem descartada em {topic} ({} bytes): {e}", payload.len());
                MessageOutcome::Skipped(e)
            }
            Ok(reading) => {
                info!("{reading}, ACK");
                match self.sink.insert_one(&reading) {
                    Ok(ack) => {
                        debug!("Inserido #{} de {topic}", ack.id);
                        MessageOutcome::Stored(ack)
                    }
                    Err(e) => {
                        match e.details() {
                            Some(details) => error!("Falha ao persistir leitura de {topic}: {e} ({details})"),
                            None => error!("Falha ao persistir leitura de {topic}: {e}"),
                        }
                        MessageOutcome::PersistFailed(e)
                    }
                }
            }
        };

        self.stats.record(&outcome);
        outcome
    }

    /// Loop de consumo. Espera no máximo `poll_timeout` por mensagem para
    /// checar o token; só sai por cancelamento ou perda da assinatura.
    pub fn run<Sub: Subscription>(
        &mut self,
        subscription: &mut Sub,
        cancel: &CancelToken,
        poll_timeout: Duration,
    ) -> Result<RelayStats, TransportError> {
        while !cancel.is_cancelled() {
            match subscription.next_message(poll_timeout)? {
                Some(Message { topic, payload }) => {
                    self.handle_message(&topic, &payload);
                }
                None => continue,
            }
        }

        info!(
            "Relay encerrado: {} recebidas, {} gravadas, {} descartadas, {} falhas",
            self.stats.received, self.stats.stored, self.stats.skipped, self.stats.failed
        );
        Ok(self.stats)
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use sensortag_core::channel::{DEFAULT_PUBLISH_TOPIC, DEFAULT_SUBSCRIBE_PATTERN, MemoryBroker, Publisher};
    use sensortag_core::storage::MemorySink;
    use sensortag_core::types::Reading;

    /// Sink que falha em posições escolhidas e conta as chamadas.
    struct FlakySink {
        calls: u64,
        fail_on: Vec<u64>,
        stored: Vec<Reading>,
    }

    impl StorageSink for FlakySink {
        fn insert_one(&mut self, reading: &Reading) -> Result<Ack, PersistenceError> {
            self.calls += 1;
            if self.fail_on.contains(&self.calls) {
                return Err(PersistenceError::DuplicateKey {
                    key: reading.timestamp.to_string(),
                    detail: "E11000 duplicate key error".into(),
                });
            }
            self.stored.push(reading.clone());
            Ok(Ack { id: self.calls })
        }
    }

    fn hourly_json(hour: u32) -> String {
        format!(
            r#"{{"Localtime":"01/01/25 {hour:02}:00:00","Ambient Temp":22.5,"Humidity":45.0,"Pressure":1012.3}}"#
        )
    }

    #[test]
    fn message_missing_field_is_skipped_without_insert() {
        let mut relay = RelaySubscriber::new(FlakySink {
            calls: 0,
            fail_on: vec![],
            stored: vec![],
        });
        let payload = br#"{"Localtime":"01/01/25 00:00:00","Ambient Temp":22.5,"Humidity":45.0}"#;

        let outcome = relay.handle_message("iot/data", payload);

        assert!(matches!(
            outcome,
            MessageOutcome::Skipped(MessageFormatError::MissingField("Pressure"))
        ));
        assert_eq!(relay.sink().calls, 0);
        assert_eq!(relay.stats().skipped, 1);
    }

    #[test]
    fn persistence_failure_does_not_stop_next_message() {
        let mut relay = RelaySubscriber::new(FlakySink {
            calls: 0,
            fail_on: vec![1],
            stored: vec![],
        });

        assert!(matches!(
            relay.handle_message("iot/data", hourly_json(0).as_bytes()),
            MessageOutcome::PersistFailed(_)
        ));
        assert!(matches!(
            relay.handle_message("iot/data", hourly_json(1).as_bytes()),
            MessageOutcome::Stored(_)
        ));
        assert_eq!(relay.sink().stored.len(), 1);
    }

    #[test]
    fn ten_messages_one_failure_nine_inserts_loop_alive() {
        let broker = MemoryBroker::new();
        let mut subscription = broker.subscribe(DEFAULT_SUBSCRIBE_PATTERN).unwrap();
        for hour in 0..10 {
            broker.publish(DEFAULT_PUBLISH_TOPIC, hourly_json(hour).as_bytes()).unwrap();
        }

        let mut relay = RelaySubscriber::new(FlakySink {
            calls: 0,
            fail_on: vec![4],
            stored: vec![],
        });

        // Consome as 10 mensagens pelo loop real e cancela quando a fila esvazia
        let cancel = CancelToken::new();
        struct Draining<'a> {
            inner: &'a mut crossbeam_channel::Receiver<Message>,
            cancel: &'a CancelToken,
        }
        impl Subscription for Draining<'_> {
            fn next_message(&mut self, timeout: Duration) -> Result<Option<Message>, TransportError> {
                let msg = self.inner.next_message(timeout)?;
                if msg.is_none() {
                    self.cancel.cancel();
                }
                Ok(msg)
            }
        }
        let stats = relay
            .run(
                &mut Draining {
                    inner: &mut subscription,
                    cancel: &cancel,
                },
                &cancel,
                Duration::from_millis(10),
            )
            .unwrap();

        assert_eq!(relay.sink().calls, 10);
        assert_eq!(relay.sink().stored.len(), 9);
        assert_eq!(
            stats,
            RelayStats {
                received: 10,
                stored: 9,
                skipped: 0,
                failed: 1,
            }
        );

        // Ainda vivo: uma nova mensagem é processada normalmente
        assert!(matches!(
            relay.handle_message("iot/data", hourly_json(11).as_bytes()),
            MessageOutcome::Stored(_)
        ));
    }

    #[test]
    fn end_to_end_publish_to_single_insert() {
        let broker = MemoryBroker::new();
        let mut subscription = broker.subscribe(DEFAULT_SUBSCRIBE_PATTERN).unwrap();
        let payload = r#"{"Localtime":"01/01/25 00:00:00","Ambient Temp":22.5,"Humidity":45.0,"Pressure":1012.3}"#;
        broker.publish(DEFAULT_PUBLISH_TOPIC, payload.as_bytes()).unwrap();

        let mut relay = RelaySubscriber::new(MemorySink::new());
        let msg = subscription
            .next_message(Duration::from_millis(10))
            .unwrap()
            .unwrap();
        let outcome = relay.handle_message(&msg.topic, &msg.payload);

        assert!(matches!(outcome, MessageOutcome::Stored(Ack { id: 1 })));
        let records = relay.sink().records();
        assert_eq!(records.len(), 1);
        let stored = &records[0];
        assert_eq!(
            stored.timestamp,
            NaiveDate::from_ymd_opt(2025, 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap()
        );
        assert_eq!(stored.ambient_temperature, 22.5);
        assert_eq!(stored.relative_humidity, 45.0);
        assert_eq!(stored.pressure_millibars, Some(1012.3));
        assert_eq!(stored.lux, None);
        assert_eq!(stored.battery_percent, None);

        // O documento gravado tem exatamente os quatro campos do schema horário
        let doc: serde_json::Value =
            serde_json::from_slice(&sensortag_core::protocol::encode_reading(stored).unwrap()).unwrap();
        assert_eq!(doc, serde_json::from_str::<serde_json::Value>(payload).unwrap());
    }

    #[test]
    fn garbage_payload_is_skipped() {
        let mut relay = RelaySubscriber::new(MemorySink::new());
        assert!(matches!(
            relay.handle_message("iot/data", b"\xFF\x00"),
            MessageOutcome::Skipped(_)
        ));
        assert!(relay.sink().records().is_empty());
    }

    #[test]
    fn lost_subscription_surfaces_transport_error() {
        let (tx, mut rx) = crossbeam_channel::unbounded::<Message>();
        drop(tx);
        let mut relay = RelaySubscriber::new(MemorySink::new());
        assert_eq!(
            relay
                .run(&mut rx, &CancelToken::new(), Duration::from_millis(1))
                .unwrap_err(),
            TransportError::Disconnected
        );
    }
}
