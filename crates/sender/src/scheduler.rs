//! Polling de cadência dupla.
//!
//! - Tick rápido: dorme `fast_interval`, lê luz e umidade em paralelo e
//!   emite um [`Reading`].
//! - Tick lento: a cada tick rápido confere se o tempo desde a última
//!   leitura de bateria passou de `battery_interval`; se sim, relê uma vez.
//!
//! A granularidade do tick lento é a do tick rápido, então ele atrasa
//! junto com a latência das leituras.

use crossbeam_channel::{Receiver, Sender, bounded};
use sensortag_core::clock::{CancelToken, Clock};
use sensortag_core::config::PollerConfig;
use sensortag_core::endpoint::{Battery, Humidity, Optical, SensorEndpoint, SensorError};
use sensortag_core::peripheral::{Peripheral, TransportError};
use sensortag_core::types::Reading;
use std::time::Duration;
use tracing::{debug, info};

/// Thread de leitura de luz que vive o `run` inteiro: um pedido por tick,
/// uma resposta pelo channel.
struct LightReader {
    requests: Sender<()>,
    replies: Receiver<Result<f64, SensorError>>,
}

impl LightReader {
    fn request(&self) -> Result<(), SensorError> {
        self.requests.send(()).map_err(|_| TransportError::Disconnected.into())
    }

    fn reply(&self) -> Result<f64, SensorError> {
        self.replies.recv().map_err(|_| SensorError::from(TransportError::Disconnected))?
    }
}

/// Scheduler dono dos endpoints armados de uma sessão.
pub struct PollingScheduler<'a, P, C> {
    peripheral: &'a P,
    clock: &'a C,
    light: SensorEndpoint<Optical>,
    humidity: SensorEndpoint<Humidity>,
    battery: SensorEndpoint<Battery>,
    fast_interval: Duration,
    battery_interval: Duration,
    battery_percent: Option<u8>,
    last_battery_read: Duration,
    started: bool,
}

impl<'a, P, C> PollingScheduler<'a, P, C>
where
    P: Peripheral + Sync,
    C: Clock,
{
    pub fn new(peripheral: &'a P, clock: &'a C, config: &PollerConfig) -> Self {
        Self {
            peripheral,
            clock,
            light: SensorEndpoint::new(),
            humidity: SensorEndpoint::new(),
            battery: SensorEndpoint::new(),
            fast_interval: config.fast_interval(),
            battery_interval: config.battery_interval(),
            battery_percent: None,
            last_battery_read: Duration::ZERO,
            started: false,
        }
    }

    pub fn battery_percent(&self) -> Option<u8> {
        self.battery_percent
    }

    /// Arma os sensores rápidos e faz a primeira leitura de bateria.
    pub fn start(&mut self) -> Result<(), SensorError> {
        self.light.enable(self.peripheral)?;
        self.humidity.enable(self.peripheral)?;
        self.battery.enable(self.peripheral)?;
        self.read_battery()?;
        self.started = true;
        Ok(())
    }

    fn read_battery(&mut self) -> Result<(), SensorError> {
        let percent = self.battery.read(self.peripheral)?;
        self.last_battery_read = self.clock.elapsed();
        self.battery_percent = Some(percent);
        info!("Bateria: {percent}%");
        Ok(())
    }

    /// Fecha os três endpoints; a sessão não é reaproveitada.
    pub fn close(&mut self) {
        self.light.close();
        self.humidity.close();
        self.battery.close();
    }

    /// Um tick rápido completo.
    ///
    /// A leitura de luz sai na thread dedicada enquanto a umidade é lida
    /// aqui; o tick só termina quando ambas terminam e falha inteiro se
    /// qualquer uma falhar.
    fn tick(&mut self, light: &LightReader) -> Result<Reading, SensorError> {
        self.clock.sleep(self.fast_interval);

        light.request()?;
        let sample = self.humidity.read(self.peripheral);
        let lux = light.reply();
        let (lux, sample) = (lux?, sample?);

        if self.clock.elapsed().saturating_sub(self.last_battery_read) > self.battery_interval {
            self.read_battery()?;
        }

        let reading = Reading::fast(self.clock.now_local(), lux, sample).with_battery(self.battery_percent);
        debug!("{reading}");
        Ok(reading)
    }

    /// Roda até o token ser cancelado. Retorna o número de ticks emitidos.
    ///
    /// Qualquer erro de leitura encerra o loop. Ao sair, por erro ou
    /// cancelamento, os endpoints ficam fechados; reconectar é papel de
    /// quem chamou.
    pub fn run<F>(&mut self, cancel: &CancelToken, emit: F) -> Result<u64, SensorError>
    where
        F: FnMut(&Reading),
    {
        let result = self.run_session(cancel, emit);
        self.close();
        match &result {
            Ok(ticks) => info!("Polling encerrado após {ticks} ticks"),
            Err(e) => info!("Polling interrompido: {e}"),
        }
        result
    }

    fn run_session<F>(&mut self, cancel: &CancelToken, mut emit: F) -> Result<u64, SensorError>
    where
        F: FnMut(&Reading),
    {
        if !self.started {
            self.start()?;
        }

        // O endpoint de luz vai para a thread e volta no join
        let peripheral = self.peripheral;
        let endpoint = std::mem::take(&mut self.light);

        std::thread::scope(|s| {
            let (requests, pending) = bounded::<()>(1);
            let (answer, replies) = bounded(1);
            let worker = s.spawn(move || {
                for () in pending {
                    if answer.send(endpoint.read(peripheral)).is_err() {
                        break;
                    }
                }
                endpoint
            });
            let light = LightReader { requests, replies };

            let mut ticks = 0u64;
            let outcome = loop {
                if cancel.is_cancelled() {
                    break Ok(ticks);
                }
                match self.tick(&light) {
                    Ok(reading) => {
                        ticks += 1;
                        emit(&reading);
                    }
                    Err(e) => break Err(e),
                }
            };

            drop(light);
            self.light = worker.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic));
            outcome
        })
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
