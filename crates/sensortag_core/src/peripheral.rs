//! Acesso ao periférico BLE.
//!
//! O transporte real (scan, conexão GATT, resolução de MAC) é externo;
//! o núcleo só enxerga leituras e escritas de características por UUID.
//! [`SimulatedSensorTag`] gera registradores sintéticos e determinísticos
//! para rodar o pipeline sem hardware.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

use crate::codec::{BAROMETER_LEN, HUMIDITY_LEN, LIGHT_LEN};
use crate::endpoint::{ADDRESSES, SensorAddresses, START_COMMAND};
use crate::types::SensorKind;

/// Falha de conectividade com periférico ou broker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Periférico desconectado")]
    Disconnected,

    #[error("Endereço inválido: {0}")]
    InvalidAddress(String),

    #[error("Tópico inválido: {0}")]
    InvalidTopic(String),

    #[error("Timeout após {0:?}")]
    Timeout(Duration),

    #[error("Erro no broker: {0}")]
    Broker(String),
}

/// Sessão aberta com um periférico.
///
/// Leituras concorrentes do mesmo tick exigem `Sync`.
pub trait Peripheral {
    fn write_characteristic(&self, uuid: &str, value: &[u8]) -> Result<(), TransportError>;

    fn read_characteristic(&self, uuid: &str) -> Result<Vec<u8>, TransportError>;
}

impl<P: Peripheral + ?Sized> Peripheral for &P {
    fn write_characteristic(&self, uuid: &str, value: &[u8]) -> Result<(), TransportError> {
        (**self).write_characteristic(uuid, value)
    }

    fn read_characteristic(&self, uuid: &str) -> Result<Vec<u8>, TransportError> {
        (**self).read_characteristic(uuid)
    }
}

/// Abre sessões com periféricos a partir do endereço (MAC ou UUID do SO).
pub trait PeripheralConnector {
    type Session: Peripheral;

    fn connect(&self, address: &str) -> Result<Self::Session, TransportError>;
}

// ──────────────────────────────────────────────
// SensorTag simulado
// ──────────────────────────────────────────────

#[derive(Debug, Default)]
struct SimState {
    connected: bool,
    armed: HashSet<SensorKind>,
    reads: u64,
}

/// SensorTag sintético.
///
/// Sensores não armados devolvem registradores zerados, como o hardware.
/// Os valores variam lentamente a cada leitura para o log não ficar estático.
#[derive(Debug)]
pub struct SimulatedSensorTag {
    address: String,
    state: Mutex<SimState>,
}

impl SimulatedSensorTag {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            state: Mutex::new(SimState {
                connected: true,
                ..Default::default()
            }),
        }
    }

    /// Encerra a sessão; leituras seguintes falham com `Disconnected`.
    pub fn disconnect(&self) {
        self.lock().connected = false;
        info!("SensorTag simulado {} desconectado", self.address);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn kind_for(uuid: &str) -> Option<(SensorKind, &'static SensorAddresses)> {
        ADDRESSES.iter().find_map(|(kind, addrs)| {
            let known = addrs.data == uuid
                || addrs.control == Some(uuid)
                || addrs.period == Some(uuid);
            known.then_some((*kind, addrs))
        })
    }
}

impl Peripheral for SimulatedSensorTag {
    fn write_characteristic(&self, uuid: &str, value: &[u8]) -> Result<(), TransportError> {
        let mut state = self.lock();
        if !state.connected {
            return Err(TransportError::Disconnected);
        }
        let (kind, addrs) =
            Self::kind_for(uuid).ok_or_else(|| TransportError::InvalidAddress(uuid.to_string()))?;

        if addrs.control == Some(uuid) {
            if value.first() == Some(&START_COMMAND) {
                state.armed.insert(kind);
            } else {
                state.armed.remove(&kind);
            }
        }
        debug!("SIM write {kind} {uuid} ← {value:02X?}");
        Ok(())
    }

    fn read_characteristic(&self, uuid: &str) -> Result<Vec<u8>, TransportError> {
        let mut state = self.lock();
        if !state.connected {
            return Err(TransportError::Disconnected);
        }
        let (kind, addrs) =
            Self::kind_for(uuid).ok_or_else(|| TransportError::InvalidAddress(uuid.to_string()))?;
        if addrs.data != uuid {
            return Err(TransportError::InvalidAddress(uuid.to_string()));
        }

        state.reads += 1;
        let phase = (state.reads as f64 / 50.0).sin();
        let armed = state.armed.contains(&kind);

        let data = match kind {
            SensorKind::Optical if armed => encode_lux(350.0 + 40.0 * phase).to_vec(),
            SensorKind::Optical => vec![0; LIGHT_LEN],
            SensorKind::Humidity if armed => encode_humidity(22.5 + 0.5 * phase, 45.0 + 2.0 * phase).to_vec(),
            SensorKind::Humidity => vec![0; HUMIDITY_LEN],
            SensorKind::Barometer if armed => encode_barometer(23.0 + 0.4 * phase, 1012.3 + 1.5 * phase).to_vec(),
            SensorKind::Barometer => vec![0; BAROMETER_LEN],
            SensorKind::Battery => vec![100u8.saturating_sub((state.reads / 10_000) as u8)],
        };
        Ok(data)
    }
}

/// Conector que sempre devolve um [`SimulatedSensorTag`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedConnector;

impl PeripheralConnector for SimulatedConnector {
    type Session = SimulatedSensorTag;

    fn connect(&self, address: &str) -> Result<Self::Session, TransportError> {
        if address.trim().is_empty() {
            return Err(TransportError::InvalidAddress("endereço vazio".into()));
        }
        info!("Conectado ao SensorTag simulado {address}");
        Ok(SimulatedSensorTag::new(address))
    }
}

// Codificadores inversos dos registradores (somente para simulação).

fn encode_lux(lux: f64) -> [u8; 2] {
    let mut mantissa = (lux / 0.01).max(0.0) as u32;
    let mut exponent = 0u32;
    while mantissa > 0x0FFF && exponent < 15 {
        mantissa >>= 1;
        exponent += 1;
    }
    let raw = ((exponent << 12) | mantissa.min(0x0FFF)) as u16;
    raw.to_le_bytes()
}

fn encode_humidity(temperature: f64, relative_humidity: f64) -> [u8; 4] {
    let raw_t = ((temperature + 40.0) / 165.0 * 65536.0).clamp(0.0, 65535.0) as u16;
    let raw_h = (relative_humidity / 100.0 * 65536.0).clamp(0.0, 65535.0) as u16;
    let t = raw_t.to_le_bytes();
    let h = raw_h.to_le_bytes();
    [t[0], t[1], h[0], h[1]]
}

fn encode_barometer(temperature: f64, millibars: f64) -> [u8; 6] {
    let t = ((temperature * 100.0).max(0.0) as u32).to_le_bytes();
    let p = ((millibars * 100.0).max(0.0) as u32).to_le_bytes();
    [t[0], t[1], t[2], p[0], p[1], p[2]]
}
