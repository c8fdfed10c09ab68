//! Formato de mensagem no broker.
//!
//! Objetos JSON planos (UTF-8), um schema fixo por pipeline:
//!
//! ```text
//! Rápido  {"timestamp": "2025-01-01 00:00:00", "lux": 350.2,
//!          "temperature": 22.5, "humidity": 45.0[, "battery": 87]}
//! Horário {"Localtime": "01/01/25 00:00:00", "Ambient Temp": 22.5,
//!          "Humidity": 45.0, "Pressure": 1012.3}
//! ```
//!
//! O schema é escolhido pela chave de timestamp. Campo obrigatório
//! ausente ou com tipo errado é erro; nada é coagido.

use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{Reading, Schema};

/// Formato de timestamp do pipeline rápido.
pub const FAST_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Formato de timestamp do pipeline horário (`%d/%m/%y %X`).
pub const HOURLY_TIMESTAMP_FORMAT: &str = "%d/%m/%y %H:%M:%S";

/// Campos obrigatórios do schema rápido.
pub const FAST_FIELDS: [&str; 4] = ["timestamp", "lux", "temperature", "humidity"];

/// Campos obrigatórios do schema horário.
pub const HOURLY_FIELDS: [&str; 4] = ["Localtime", "Ambient Temp", "Humidity", "Pressure"];

/// Mensagem malformada ou inválida.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageFormatError {
    #[error("Payload não é UTF-8 válido: {0}")]
    NotUtf8(String),

    #[error("JSON inválido: {0}")]
    Json(String),

    #[error("Mensagem não é um objeto JSON")]
    NotAnObject,

    #[error("Campo obrigatório ausente: '{0}'")]
    MissingField(&'static str),

    #[error("Timestamp '{value}' fora do formato {format}")]
    InvalidTimestamp { value: String, format: &'static str },

    #[error("Erro de serialização: {0}")]
    Serialize(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct FastMessage {
    timestamp: String,
    lux: f64,
    temperature: f64,
    humidity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    battery: Option<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct HourlyMessage {
    #[serde(rename = "Localtime")]
    localtime: String,
    #[serde(rename = "Ambient Temp")]
    ambient_temp: f64,
    #[serde(rename = "Humidity")]
    humidity: f64,
    #[serde(rename = "Pressure")]
    pressure: f64,
}

/// Codifica um [`Reading`] no schema do seu pipeline.
pub fn encode_reading(reading: &Reading) -> Result<Vec<u8>, MessageFormatError> {
    let encoded = match reading.schema() {
        Schema::Hourly => serde_json::to_vec(&HourlyMessage {
            localtime: reading.timestamp.format(HOURLY_TIMESTAMP_FORMAT).to_string(),
            ambient_temp: reading.ambient_temperature,
            humidity: reading.relative_humidity,
            pressure: reading.pressure_millibars.unwrap_or_default(),
        }),
        Schema::Fast => {
            let lux = reading.lux.ok_or(MessageFormatError::MissingField("lux"))?;
            serde_json::to_vec(&FastMessage {
                timestamp: reading.timestamp.format(FAST_TIMESTAMP_FORMAT).to_string(),
                lux,
                temperature: reading.ambient_temperature,
                humidity: reading.relative_humidity,
                battery: reading.battery_percent,
            })
        }
    };
    encoded.map_err(|e| MessageFormatError::Serialize(e.to_string()))
}

/// Decodifica e valida uma mensagem recebida do broker.
pub fn decode_reading(payload: &[u8]) -> Result<Reading, MessageFormatError> {
    let text = std::str::from_utf8(payload).map_err(|e| MessageFormatError::NotUtf8(e.to_string()))?;
    let value: Value = serde_json::from_str(text).map_err(|e| MessageFormatError::Json(e.to_string()))?;
    let Value::Object(object) = value else {
        return Err(MessageFormatError::NotAnObject);
    };

    if object.contains_key(HOURLY_FIELDS[0]) {
        let msg: HourlyMessage = typed(object, &HOURLY_FIELDS)?;
        Ok(Reading {
            timestamp: parse_timestamp(&msg.localtime, HOURLY_TIMESTAMP_FORMAT)?,
            ambient_temperature: msg.ambient_temp,
            relative_humidity: msg.humidity,
            lux: None,
            pressure_millibars: Some(msg.pressure),
            battery_percent: None,
        })
    } else if object.contains_key(FAST_FIELDS[0]) {
        let msg: FastMessage = typed(object, &FAST_FIELDS)?;
        Ok(Reading {
            timestamp: parse_timestamp(&msg.timestamp, FAST_TIMESTAMP_FORMAT)?,
            ambient_temperature: msg.temperature,
            relative_humidity: msg.humidity,
            lux: Some(msg.lux),
            pressure_millibars: None,
            battery_percent: msg.battery,
        })
    } else {
        Err(MessageFormatError::MissingField(HOURLY_FIELDS[0]))
    }
}

/// Confere presença dos campos antes de deixar o serde checar os tipos.
fn typed<T: DeserializeOwned>(
    object: Map<String, Value>,
    required: &[&'static str],
) -> Result<T, MessageFormatError> {
    if let Some(missing) = required.iter().find(|key| !object.contains_key(**key)) {
        return Err(MessageFormatError::MissingField(*missing));
    }
    serde_json::from_value(Value::Object(object)).map_err(|e| MessageFormatError::Json(e.to_string()))
}

fn parse_timestamp(value: &str, format: &'static str) -> Result<NaiveDateTime, MessageFormatError> {
    NaiveDateTime::parse_from_str(value, format).map_err(|_| MessageFormatError::InvalidTimestamp {
        value: value.to_string(),
        format,
    })
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
