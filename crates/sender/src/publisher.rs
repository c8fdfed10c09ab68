//! Relay horário: umidade + barômetro → JSON → broker.
//!
//! A cadência se autocorrige: o sleep desconta o tempo gasto no ciclo,
//! então o intervalo início-a-início fica perto do alvo. Se o ciclo passar
//! do alvo, o próximo começa imediatamente (nunca sleep negativo).

use sensortag_core::channel::Publisher;
use sensortag_core::clock::{CancelToken, Clock};
use sensortag_core::config::PublisherConfig;
use sensortag_core::endpoint::{Barometer, Battery, Humidity, SensorEndpoint, SensorError};
use sensortag_core::peripheral::{Peripheral, TransportError};
use sensortag_core::protocol::{MessageFormatError, encode_reading};
use sensortag_core::types::Reading;
use std::time::Duration;
use tracing::{info, warn};

/// Erros que encerram o relay.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    #[error("Falha de sensor: {0}")]
    Sensor(#[from] SensorError),

    #[error("Falha no broker: {0}")]
    Transport(#[from] TransportError),

    #[error("Falha ao codificar: {0}")]
    Format(#[from] MessageFormatError),
}

/// Atraso até o próximo ciclo: `target - elapsed`, com piso em zero.
pub fn next_delay(target: Duration, elapsed: Duration) -> Duration {
    target.saturating_sub(elapsed)
}

/// Publicador horário. Recebe broker, periférico e relógio explicitamente.
pub struct RelayPublisher<'a, B, P, C> {
    broker: &'a B,
    peripheral: &'a P,
    clock: &'a C,
    humidity: SensorEndpoint<Humidity>,
    barometer: SensorEndpoint<Barometer>,
    battery: SensorEndpoint<Battery>,
    battery_percent: Option<u8>,
    topic: String,
    interval: Duration,
    warmup: Duration,
}

impl<'a, B, P, C> RelayPublisher<'a, B, P, C>
where
    B: Publisher,
    P: Peripheral,
    C: Clock,
{
    pub fn new(broker: &'a B, peripheral: &'a P, clock: &'a C, config: &PublisherConfig) -> Self {
        Self {
            broker,
            peripheral,
            clock,
            humidity: SensorEndpoint::new(),
            barometer: SensorEndpoint::new(),
            battery: SensorEndpoint::new(),
            battery_percent: None,
            topic: config.topic.clone(),
            interval: config.interval(),
            warmup: config.warmup(),
        }
    }

    /// Arma umidade e barômetro; lê a bateria uma única vez.
    pub fn start(&mut self) -> Result<(), SensorError> {
        self.humidity.enable(self.peripheral)?;
        self.barometer.enable(self.peripheral)?;
        self.battery.enable(self.peripheral)?;

        let percent = self.battery.read(self.peripheral)?;
        self.battery_percent = Some(percent);
        info!("Bateria do SensorTag: {percent}%");
        Ok(())
    }

    /// Um ciclo: lê, monta a leitura horária e publica (fire-and-forget).
    pub fn publish_once(&mut self) -> Result<Reading, PublishError> {
        if !self.warmup.is_zero() {
            self.clock.sleep(self.warmup);
        }

        let humidity = self.humidity.read(self.peripheral)?;
        let pressure = self.barometer.read(self.peripheral)?;
        let reading =
            Reading::hourly(self.clock.now_local(), humidity, pressure).with_battery(self.battery_percent);

        let payload = encode_reading(&reading)?;
        self.broker.publish(&self.topic, &payload)?;
        info!("→ {} ({} bytes) | {reading}", self.topic, payload.len());

        Ok(reading)
    }

    /// Fecha os endpoints; a sessão não é reaproveitada.
    pub fn close(&mut self) {
        self.humidity.close();
        self.barometer.close();
        self.battery.close();
    }

    /// Loop horário até o token ser cancelado. Retorna ciclos publicados.
    ///
    /// Ao sair, por erro ou cancelamento, os endpoints ficam fechados.
    pub fn run(&mut self, cancel: &CancelToken) -> Result<u64, PublishError> {
        let result = self.run_session(cancel);
        self.close();
        match &result {
            Ok(cycles) => info!("Relay encerrado após {cycles} ciclos"),
            Err(e) => info!("Relay interrompido: {e}"),
        }
        result
    }

    fn run_session(&mut self, cancel: &CancelToken) -> Result<u64, PublishError> {
        self.start()?;

        let mut cycles = 0u64;
        while !cancel.is_cancelled() {
            let cycle_start = self.clock.elapsed();
            self.publish_once()?;
            cycles += 1;

            let elapsed = self.clock.elapsed().saturating_sub(cycle_start);
            let delay = next_delay(self.interval, elapsed);
            if delay.is_zero() {
                warn!(
                    "Ciclo levou {:.1}s (alvo {:.1}s); próximo ciclo imediato",
                    elapsed.as_secs_f64(),
                    self.interval.as_secs_f64()
                );
            } else if !cancel.is_cancelled() {
                self.clock.sleep(delay);
            }
        }

        Ok(cycles)
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
