//! # SensorTag Core
//!
//! Crate compartilhada do relay de telemetria do TI CC2650 SensorTag:
//! decode dos registradores, endpoints de sensor, formato de mensagem,
//! capacidades externas (periférico, broker, storage) e configuração TOML.
//!
//! ## Módulos
//! - [`codec`] – Registradores binários → grandezas físicas
//! - [`endpoint`] – Endereços GATT, enable/read por tipo de sensor
//! - [`peripheral`] – Capacidade de acesso ao periférico + simulador
//! - [`types`] – `Reading` e amostras decodificadas
//! - [`protocol`] – Encode/decode JSON dos schemas rápido e horário
//! - [`channel`] – Publish/subscribe, tópicos MQTT, broker em memória
//! - [`storage`] – Sinks de persistência
//! - [`clock`] – Relógio e cancelamento dos loops
//! - [`config`] – Configuração unificada via TOML

pub mod channel;
pub mod clock;
pub mod codec;
pub mod config;
pub mod endpoint;
pub mod peripheral;
pub mod protocol;
pub mod storage;
pub mod types;

// Re-exports convenientes
pub use channel::{Message, Publisher, Subscription};
pub use clock::{CancelToken, Clock, SystemClock};
pub use codec::DecodeError;
pub use config::AppConfig;
pub use endpoint::{SensorEndpoint, SensorError};
pub use peripheral::{Peripheral, TransportError};
pub use protocol::{MessageFormatError, decode_reading, encode_reading};
pub use storage::{Ack, PersistenceError, StorageSink};
pub use types::{Reading, Schema, SensorKind};
