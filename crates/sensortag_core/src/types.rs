//! Tipos de leitura compartilhados entre Sender e Receiver.
//!
//! Um [`Reading`] é o registro canônico de telemetria. O mesmo struct atende
//! os dois pipelines; o [`Schema`] é derivado dos campos opcionais presentes.

use chrono::NaiveDateTime;
use std::fmt;

use crate::protocol::{FAST_TIMESTAMP_FORMAT, HOURLY_TIMESTAMP_FORMAT};

// ──────────────────────────────────────────────
// Tipos de sensor
// ──────────────────────────────────────────────

/// Tipos de sensor suportados pelo SensorTag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    /// Sensor óptico (OPT3001) – lux
    Optical,
    /// Sensor de umidade (HDC1000) – °C + %RH
    Humidity,
    /// Barômetro (BMP280) – °C + mbar
    Barometer,
    /// Serviço padrão de bateria BLE – %
    Battery,
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SensorKind::Optical => "optical",
            SensorKind::Humidity => "humidity",
            SensorKind::Barometer => "barometer",
            SensorKind::Battery => "battery",
        };
        f.write_str(name)
    }
}

// ──────────────────────────────────────────────
// Amostras decodificadas
// ──────────────────────────────────────────────

/// Amostra do sensor de umidade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HumiditySample {
    /// Temperatura ambiente (°C)
    pub temperature: f64,
    /// Umidade relativa (0–100%)
    pub relative_humidity: f64,
}

/// Amostra do barômetro.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureSample {
    /// Temperatura interna do barômetro (°C)
    pub temperature: f64,
    /// Pressão (mbar / hPa)
    pub millibars: f64,
}

// ──────────────────────────────────────────────
// Reading
// ──────────────────────────────────────────────

/// Variante de pipeline que produziu a leitura.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Schema {
    /// Polling rápido: timestamp, lux, temperatura, umidade
    Fast,
    /// Relay horário: Localtime, Ambient Temp, Humidity, Pressure
    Hourly,
}

/// Registro canônico de telemetria.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Instante local da captura (precisão de segundos)
    pub timestamp: NaiveDateTime,
    /// Temperatura ambiente (°C) vinda do sensor de umidade
    pub ambient_temperature: f64,
    /// Umidade relativa (0–100%)
    pub relative_humidity: f64,
    /// Luminosidade (lux) – só no pipeline rápido
    pub lux: Option<f64>,
    /// Pressão (mbar) – só no pipeline horário
    pub pressure_millibars: Option<f64>,
    /// Bateria (0–100%) – atualizada na cadência lenta
    pub battery_percent: Option<u8>,
}

impl Reading {
    /// Leitura do pipeline rápido.
    pub fn fast(timestamp: NaiveDateTime, lux: f64, humidity: HumiditySample) -> Self {
        Self {
            timestamp,
            ambient_temperature: humidity.temperature,
            relative_humidity: humidity.relative_humidity,
            lux: Some(lux),
            pressure_millibars: None,
            battery_percent: None,
        }
    }

    /// Leitura do pipeline horário.
    pub fn hourly(timestamp: NaiveDateTime, humidity: HumiditySample, pressure: PressureSample) -> Self {
        Self {
            timestamp,
            ambient_temperature: humidity.temperature,
            relative_humidity: humidity.relative_humidity,
            lux: None,
            pressure_millibars: Some(pressure.millibars),
            battery_percent: None,
        }
    }

    pub fn with_battery(mut self, battery_percent: Option<u8>) -> Self {
        self.battery_percent = battery_percent;
        self
    }

    /// Pressão presente ⇒ horário; caso contrário, rápido.
    pub fn schema(&self) -> Schema {
        if self.pressure_millibars.is_some() {
            Schema::Hourly
        } else {
            Schema::Fast
        }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.schema() {
            Schema::Hourly => write!(
                f,
                "Localtime: {}, Ambient Temp: {:.6}, Humidity: {:.6}, Pressure: {:.6}",
                self.timestamp.format(HOURLY_TIMESTAMP_FORMAT),
                self.ambient_temperature,
                self.relative_humidity,
                self.pressure_millibars.unwrap_or_default(),
            ),
            Schema::Fast => {
                write!(
                    f,
                    "[{}] {:.2} lux | {:.2}°C | {:.2}%",
                    self.timestamp.format(FAST_TIMESTAMP_FORMAT),
                    self.lux.unwrap_or_default(),
                    self.ambient_temperature,
                    self.relative_humidity,
                )?;
                if let Some(battery) = self.battery_percent {
                    write!(f, " | bateria {battery}%")?;
                }
                Ok(())
            }
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 1)
            .and_then(|d| d.and_hms_opt(h, m, s))
            .unwrap()
    }

    const HUMIDITY: HumiditySample = HumiditySample {
        temperature: 22.5,
        relative_humidity: 45.0,
    };

    #[test]
    fn schema_follows_optional_fields() {
        let fast = Reading::fast(at(0, 0, 0), 120.0, HUMIDITY);
        assert_eq!(fast.schema(), Schema::Fast);

        let hourly = Reading::hourly(
            at(0, 0, 0),
            HUMIDITY,
            PressureSample {
                temperature: 23.0,
                millibars: 1012.3,
            },
        );
        assert_eq!(hourly.schema(), Schema::Hourly);
        assert_eq!(hourly.lux, None);
    }

    #[test]
    fn hourly_summary_matches_console_format() {
        let reading = Reading::hourly(
            at(0, 0, 0),
            HUMIDITY,
            PressureSample {
                temperature: 23.0,
                millibars: 1012.3,
            },
        );
        assert_eq!(
            reading.to_string(),
            "Localtime: 01/01/25 00:00:00, Ambient Temp: 22.500000, Humidity: 45.000000, Pressure: 1012.300000"
        );
    }

    #[test]
    fn fast_summary_shows_battery_when_known() {
        let reading = Reading::fast(at(12, 30, 5), 3.5, HUMIDITY).with_battery(Some(87));
        let text = reading.to_string();
        assert!(text.starts_with("[2025-01-01 12:30:05]"), "{text}");
        assert!(text.ends_with("bateria 87%"), "{text}");
    }
}
