//! Decodificação dos registradores de dados do SensorTag CC2650.
//!
//! Funções puras: recebem o buffer lido da característica de dados e
//! devolvem a grandeza física. Todas compartilham a assinatura
//! `fn(sender, data)`; o `sender` não participa da conta.
//!
//! ```text
//! Óptico     [raw: i16 LE]                  lux = 0.01 × (m << e)
//!            m = raw & 0x0FFF, e = raw >> 12
//! Umidade    [rawT: u16 LE][rawH: u16 LE]   T  = -40 + 165 × rawT / 65536
//!                                           RH = 100 × rawH / 65536
//! Barômetro  [rawT: u24 LE][rawP: u24 LE]   T  = rawT / 100, P = rawP / 100
//! Bateria    [pct: u8]...                   pct
//! ```

use crate::types::{HumiditySample, PressureSample, SensorKind};

/// Tamanho do registrador óptico.
pub const LIGHT_LEN: usize = 2;
/// Tamanho do registrador de umidade.
pub const HUMIDITY_LEN: usize = 4;
/// Tamanho do registrador do barômetro.
pub const BAROMETER_LEN: usize = 6;

/// Buffer com tamanho incompatível com o sensor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Buffer de {kind} com {actual} bytes (esperado {expected})")]
    WrongLength {
        kind: SensorKind,
        expected: usize,
        actual: usize,
    },

    #[error("Buffer de {kind} vazio")]
    Empty { kind: SensorKind },
}

fn expect_len(kind: SensorKind, data: &[u8], expected: usize) -> Result<(), DecodeError> {
    if data.len() != expected {
        return Err(DecodeError::WrongLength {
            kind,
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

/// Decodifica o sensor óptico em lux.
pub fn decode_light(_sender: u16, data: &[u8]) -> Result<f64, DecodeError> {
    expect_len(SensorKind::Optical, data, LIGHT_LEN)?;

    let raw = i16::from_le_bytes([data[0], data[1]]) as u16;
    let mantissa = u32::from(raw & 0x0FFF);
    let exponent = u32::from((raw & 0xF000) >> 12);

    Ok(0.01 * f64::from(mantissa << exponent))
}

/// Decodifica o sensor de umidade em (temperatura, umidade relativa).
pub fn decode_humidity(_sender: u16, data: &[u8]) -> Result<HumiditySample, DecodeError> {
    expect_len(SensorKind::Humidity, data, HUMIDITY_LEN)?;

    let raw_t = u16::from_le_bytes([data[0], data[1]]);
    let raw_h = u16::from_le_bytes([data[2], data[3]]);

    Ok(HumiditySample {
        temperature: -40.0 + 165.0 * (f64::from(raw_t) / 65536.0),
        relative_humidity: 100.0 * (f64::from(raw_h) / 65536.0),
    })
}

/// Decodifica o barômetro em (temperatura, pressão em mbar).
pub fn decode_barometer(_sender: u16, data: &[u8]) -> Result<PressureSample, DecodeError> {
    expect_len(SensorKind::Barometer, data, BAROMETER_LEN)?;

    let raw_t = u32::from_le_bytes([data[0], data[1], data[2], 0]);
    let raw_p = u32::from_le_bytes([data[3], data[4], data[5], 0]);

    Ok(PressureSample {
        temperature: f64::from(raw_t) / 100.0,
        millibars: f64::from(raw_p) / 100.0,
    })
}

/// Decodifica o nível de bateria. Só o primeiro byte importa.
pub fn decode_battery(_sender: u16, data: &[u8]) -> Result<u8, DecodeError> {
    data.first().copied().ok_or(DecodeError::Empty {
        kind: SensorKind::Battery,
    })
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
