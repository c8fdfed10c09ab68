//! Endpoints de sensor: endereços GATT + enable/read por tipo.
//!
//! Cada tipo de sensor é um perfil estático ([`SensorProfile`]) com seus
//! endereços constantes e a função de decode do [`codec`](crate::codec).
//! O ciclo de vida do endpoint é `Unarmed → Armed → Closed`.

use std::marker::PhantomData;
use tracing::{debug, trace};

use crate::codec::{self, DecodeError};
use crate::peripheral::{Peripheral, TransportError};
use crate::types::{HumiditySample, PressureSample, SensorKind};

/// Comando que liga a medição do sensor.
pub const START_COMMAND: u8 = 0x01;

/// Código de período: intervalo mínimo suportado pelo firmware (100 ms).
pub const PERIOD_MINIMUM: u8 = 0x0A;

/// Identificador repassado ao decode (não entra na conta).
const SENDER_ID: u16 = 1;

/// Endereços (UUIDs de característica) de um sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorAddresses {
    pub data: &'static str,
    pub control: Option<&'static str>,
    pub period: Option<&'static str>,
}

pub const OPTICAL: SensorAddresses = SensorAddresses {
    data: "f000aa71-0451-4000-b000-000000000000",
    control: Some("f000aa72-0451-4000-b000-000000000000"),
    period: Some("f000aa73-0451-4000-b000-000000000000"),
};

pub const HUMIDITY: SensorAddresses = SensorAddresses {
    data: "f000aa21-0451-4000-b000-000000000000",
    control: Some("f000aa22-0451-4000-b000-000000000000"),
    period: Some("f000aa23-0451-4000-b000-000000000000"),
};

pub const BAROMETER: SensorAddresses = SensorAddresses {
    data: "f000aa41-0451-4000-b000-000000000000",
    control: Some("f000aa42-0451-4000-b000-000000000000"),
    period: Some("f000aa44-0451-4000-b000-000000000000"),
};

/// Serviço padrão de bateria: só dados, sempre ativo.
pub const BATTERY: SensorAddresses = SensorAddresses {
    data: "00002a19-0000-1000-8000-00805f9b34fb",
    control: None,
    period: None,
};

/// Tabela completa tipo → endereços.
pub static ADDRESSES: [(SensorKind, SensorAddresses); 4] = [
    (SensorKind::Optical, OPTICAL),
    (SensorKind::Humidity, HUMIDITY),
    (SensorKind::Barometer, BAROMETER),
    (SensorKind::Battery, BATTERY),
];

// ──────────────────────────────────────────────
// Perfis
// ──────────────────────────────────────────────

/// Perfil estático de um tipo de sensor.
pub trait SensorProfile {
    type Value;

    const KIND: SensorKind;
    const ADDRESSES: SensorAddresses;

    fn decode(sender: u16, data: &[u8]) -> Result<Self::Value, DecodeError>;
}

/// Sensor óptico → lux.
#[derive(Debug)]
pub struct Optical;

impl SensorProfile for Optical {
    type Value = f64;
    const KIND: SensorKind = SensorKind::Optical;
    const ADDRESSES: SensorAddresses = OPTICAL;

    fn decode(sender: u16, data: &[u8]) -> Result<f64, DecodeError> {
        codec::decode_light(sender, data)
    }
}

/// Sensor de umidade → (°C, %RH).
#[derive(Debug)]
pub struct Humidity;

impl SensorProfile for Humidity {
    type Value = HumiditySample;
    const KIND: SensorKind = SensorKind::Humidity;
    const ADDRESSES: SensorAddresses = HUMIDITY;

    fn decode(sender: u16, data: &[u8]) -> Result<HumiditySample, DecodeError> {
        codec::decode_humidity(sender, data)
    }
}

/// Barômetro → (°C, mbar).
#[derive(Debug)]
pub struct Barometer;

impl SensorProfile for Barometer {
    type Value = PressureSample;
    const KIND: SensorKind = SensorKind::Barometer;
    const ADDRESSES: SensorAddresses = BAROMETER;

    fn decode(sender: u16, data: &[u8]) -> Result<PressureSample, DecodeError> {
        codec::decode_barometer(sender, data)
    }
}

/// Bateria → %.
#[derive(Debug)]
pub struct Battery;

impl SensorProfile for Battery {
    type Value = u8;
    const KIND: SensorKind = SensorKind::Battery;
    const ADDRESSES: SensorAddresses = BATTERY;

    fn decode(sender: u16, data: &[u8]) -> Result<u8, DecodeError> {
        codec::decode_battery(sender, data)
    }
}

// ──────────────────────────────────────────────
// Endpoint
// ──────────────────────────────────────────────

/// Erro de leitura de um endpoint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SensorError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Unarmed,
    Armed,
    Closed,
}

/// Um sensor do periférico.
///
/// `enable` deve ser chamado uma única vez: o firmware não garante
/// tolerar rearmes. Ler antes do `enable` é permitido, mas devolve dados
/// antigos ou zerados; o endpoint não detecta isso. O mesmo vale para
/// polling mais rápido que o período configurado.
#[derive(Debug)]
pub struct SensorEndpoint<S: SensorProfile> {
    state: EndpointState,
    _profile: PhantomData<fn() -> S>,
}

impl<S: SensorProfile> Default for SensorEndpoint<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: SensorProfile> SensorEndpoint<S> {
    pub fn new() -> Self {
        Self {
            state: EndpointState::Unarmed,
            _profile: PhantomData,
        }
    }

    pub fn state(&self) -> EndpointState {
        self.state
    }

    /// Liga o sensor (`0x01` no controle) e fixa o período mínimo (`0x0A`).
    ///
    /// Nenhuma confirmação é lida de volta.
    pub fn enable<P: Peripheral + ?Sized>(&mut self, peripheral: &P) -> Result<&mut Self, TransportError> {
        if self.state == EndpointState::Closed {
            return Err(TransportError::Disconnected);
        }
        if let Some(control) = S::ADDRESSES.control {
            peripheral.write_characteristic(control, &[START_COMMAND])?;
        }
        if let Some(period) = S::ADDRESSES.period {
            peripheral.write_characteristic(period, &[PERIOD_MINIMUM])?;
        }

        debug!("Sensor {} armado", S::KIND);
        self.state = EndpointState::Armed;
        Ok(self)
    }

    /// Lê a característica de dados e decodifica.
    pub fn read<P: Peripheral + ?Sized>(&self, peripheral: &P) -> Result<S::Value, SensorError> {
        if self.state == EndpointState::Closed {
            return Err(TransportError::Disconnected.into());
        }
        let data = peripheral.read_characteristic(S::ADDRESSES.data)?;
        trace!("Sensor {} → {} bytes", S::KIND, data.len());
        Ok(S::decode(SENDER_ID, &data)?)
    }

    /// Fim da sessão com o periférico.
    pub fn close(&mut self) {
        if self.state != EndpointState::Closed {
            debug!("Sensor {} fechado", S::KIND);
        }
        self.state = EndpointState::Closed;
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Periférico que registra escritas e devolve um buffer fixo.
    #[derive(Default)]
    struct Recorder {
        writes: Mutex<Vec<(String, Vec<u8>)>>,
        reply: Vec<u8>,
        fail_reads: bool,
    }

    impl Peripheral for Recorder {
        fn write_characteristic(&self, uuid: &str, value: &[u8]) -> Result<(), TransportError> {
            self.writes.lock().unwrap().push((uuid.to_string(), value.to_vec()));
            Ok(())
        }

        fn read_characteristic(&self, _uuid: &str) -> Result<Vec<u8>, TransportError> {
            if self.fail_reads {
                return Err(TransportError::Disconnected);
            }
            Ok(self.reply.clone())
        }
    }

    #[test]
    fn enable_writes_start_then_period() {
        let peripheral = Recorder::default();
        let mut light = SensorEndpoint::<Optical>::new();
        assert_eq!(light.state(), EndpointState::Unarmed);

        light.enable(&peripheral).unwrap();

        let writes = peripheral.writes.lock().unwrap();
        assert_eq!(
            *writes,
            vec![
                ("f000aa72-0451-4000-b000-000000000000".to_string(), vec![0x01]),
                ("f000aa73-0451-4000-b000-000000000000".to_string(), vec![0x0A]),
            ]
        );
        assert_eq!(light.state(), EndpointState::Armed);
    }

    #[test]
    fn enable_chains() {
        let peripheral = Recorder {
            reply: vec![0x00, 0x00, 0x00, 0x80],
            ..Default::default()
        };
        let mut humidity = SensorEndpoint::<Humidity>::new();
        let sample = humidity.enable(&peripheral).unwrap().read(&peripheral).unwrap();
        assert_eq!(sample.relative_humidity, 50.0);
    }

    #[test]
    fn battery_enable_does_no_io() {
        let peripheral = Recorder::default();
        let mut battery = SensorEndpoint::<Battery>::new();
        battery.enable(&peripheral).unwrap();
        assert!(peripheral.writes.lock().unwrap().is_empty());
        assert_eq!(battery.state(), EndpointState::Armed);
    }

    #[test]
    fn read_propagates_decode_error() {
        let peripheral = Recorder {
            reply: vec![0x01, 0x02, 0x03],
            ..Default::default()
        };
        let light = SensorEndpoint::<Optical>::new();
        assert!(matches!(
            light.read(&peripheral),
            Err(SensorError::Decode(DecodeError::WrongLength { actual: 3, .. }))
        ));
    }

    #[test]
    fn read_propagates_transport_error() {
        let peripheral = Recorder {
            fail_reads: true,
            ..Default::default()
        };
        let battery = SensorEndpoint::<Battery>::new();
        assert_eq!(
            battery.read(&peripheral),
            Err(SensorError::Transport(TransportError::Disconnected))
        );
    }

    #[test]
    fn closed_endpoint_refuses_io() {
        let peripheral = Recorder {
            reply: vec![50],
            ..Default::default()
        };
        let mut battery = SensorEndpoint::<Battery>::new();
        battery.close();
        assert!(battery.read(&peripheral).is_err());
        assert!(battery.enable(&peripheral).is_err());
    }

    #[test]
    fn address_table_covers_every_kind() {
        for (kind, addrs) in &ADDRESSES {
            assert!(!addrs.data.is_empty(), "{kind} sem endereço de dados");
            assert_eq!(addrs.control.is_some(), addrs.period.is_some(), "{kind}");
        }
    }
}
