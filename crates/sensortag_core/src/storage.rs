//! Sinks de persistência.
//!
//! O document store real é externo; o Receiver só precisa de
//! `insert_one`. Cada inserção é independente (sem transação entre
//! leituras).
//!
//! - [`MemorySink`] – testes
//! - [`JsonLinesSink`] – um objeto JSON por linha, append-only
//! - [`CsvSink`] – espelho em CSV local

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::protocol::{self, HOURLY_TIMESTAMP_FORMAT};
use crate::types::{Reading, Schema};

/// Confirmação de inserção.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// Sequencial da inserção dentro do sink
    pub id: u64,
}

/// Falha ao persistir uma leitura.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Chave duplicada '{key}'")]
    DuplicateKey { key: String, detail: String },

    #[error("Erro de E/S no sink: {0}")]
    Io(#[from] std::io::Error),

    #[error("Erro ao codificar leitura: {0}")]
    Encode(#[from] protocol::MessageFormatError),

    #[error("Inserção rejeitada: {0}")]
    Rejected(String),
}

impl PersistenceError {
    /// Detalhe estruturado fornecido pelo sink, se houver.
    pub fn details(&self) -> Option<&str> {
        match self {
            PersistenceError::DuplicateKey { detail, .. } => Some(detail),
            _ => None,
        }
    }
}

/// Destino durável das leituras.
pub trait StorageSink {
    fn insert_one(&mut self, reading: &Reading) -> Result<Ack, PersistenceError>;
}

impl<S: StorageSink + ?Sized> StorageSink for Box<S> {
    fn insert_one(&mut self, reading: &Reading) -> Result<Ack, PersistenceError> {
        (**self).insert_one(reading)
    }
}

impl<S: StorageSink + ?Sized> StorageSink for &mut S {
    fn insert_one(&mut self, reading: &Reading) -> Result<Ack, PersistenceError> {
        (**self).insert_one(reading)
    }
}

// ──────────────────────────────────────────────
// Memória
// ──────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemorySink {
    records: Vec<Reading>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[Reading] {
        &self.records
    }
}

impl StorageSink for MemorySink {
    fn insert_one(&mut self, reading: &Reading) -> Result<Ack, PersistenceError> {
        self.records.push(reading.clone());
        Ok(Ack {
            id: self.records.len() as u64,
        })
    }
}

// ──────────────────────────────────────────────
// JSON Lines
// ──────────────────────────────────────────────

/// Arquivo JSON Lines com índice único opcional no `Localtime` das
/// leituras horárias. Leituras rápidas nunca são deduplicadas (vários
/// ticks caem no mesmo segundo).
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    file: File,
    unique_hourly: bool,
    keys: HashSet<String>,
    inserted: u64,
    /// Última linha do arquivo sem `\n` (escrita interrompida)
    torn_tail: bool,
}

impl JsonLinesSink {
    /// Abre (ou cria) o arquivo e reconstrói o índice a partir do conteúdo.
    pub fn open(path: &Path, unique_hourly: bool) -> Result<Self, PersistenceError> {
        let mut keys = HashSet::new();
        let mut inserted = 0;
        let mut torn_tail = false;

        if path.exists() {
            let content = std::fs::read(path)?;
            torn_tail = content.last().is_some_and(|b| *b != b'\n');
            for (line_no, line) in content.split(|b| *b == b'\n').enumerate() {
                if line.trim_ascii().is_empty() {
                    continue;
                }
                match protocol::decode_reading(line) {
                    Ok(reading) => {
                        inserted += 1;
                        if let Some(key) = hourly_key(&reading) {
                            keys.insert(key);
                        }
                    }
                    Err(e) => warn!("{}:{}: linha ignorada ({e})", path.display(), line_no + 1),
                }
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        info!("Sink JSON Lines aberto em {} ({inserted} registros)", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            file,
            unique_hourly,
            keys,
            inserted,
            torn_tail,
        })
    }
}

fn hourly_key(reading: &Reading) -> Option<String> {
    (reading.schema() == Schema::Hourly)
        .then(|| reading.timestamp.format(HOURLY_TIMESTAMP_FORMAT).to_string())
}

impl StorageSink for JsonLinesSink {
    fn insert_one(&mut self, reading: &Reading) -> Result<Ack, PersistenceError> {
        let key = hourly_key(reading);
        if self.unique_hourly {
            if let Some(key) = key.as_ref().filter(|k| self.keys.contains(*k)) {
                return Err(PersistenceError::DuplicateKey {
                    key: key.clone(),
                    detail: format!(
                        "índice único Localtime em {}: registro já existente",
                        self.path.display()
                    ),
                });
            }
        }

        let mut line = Vec::new();
        if self.torn_tail {
            // Isola o fragmento deixado por uma escrita interrompida
            line.push(b'\n');
        }
        line.extend(protocol::encode_reading(reading)?);
        line.push(b'\n');

        let len_before = self.file.metadata()?.len();
        if let Err(e) = self.file.write_all(&line).and_then(|()| self.file.flush()) {
            if self.file.set_len(len_before).is_err() {
                self.torn_tail = true;
            }
            return Err(e.into());
        }
        self.torn_tail = false;

        if let Some(key) = key {
            self.keys.insert(key);
        }
        self.inserted += 1;
        Ok(Ack { id: self.inserted })
    }
}

// ──────────────────────────────────────────────
// CSV
// ──────────────────────────────────────────────

const CSV_HEADER: &str = "timestamp,ambient_temp,humidity,lux,pressure,battery";

/// Espelho CSV local (uma linha por leitura; colunas ausentes vazias).
#[derive(Debug)]
pub struct CsvSink {
    file: File,
    inserted: u64,
}

impl CsvSink {
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        let is_new = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if is_new {
            writeln!(file, "{CSV_HEADER}")?;
        }
        info!("Sink CSV aberto em {}", path.display());
        Ok(Self { file, inserted: 0 })
    }
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

impl StorageSink for CsvSink {
    fn insert_one(&mut self, reading: &Reading) -> Result<Ack, PersistenceError> {
        writeln!(
            self.file,
            "{},{},{},{},{},{}",
            reading.timestamp.format(protocol::FAST_TIMESTAMP_FORMAT),
            reading.ambient_temperature,
            reading.relative_humidity,
            optional(reading.lux),
            optional(reading.pressure_millibars),
            optional(reading.battery_percent),
        )?;
        self.file.flush()?;
        self.inserted += 1;
        Ok(Ack { id: self.inserted })
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HumiditySample, PressureSample};
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 1)
            .and_then(|d| d.and_hms_opt(hour, 0, 0))
            .unwrap()
    }

    fn hourly(hour: u32) -> Reading {
        Reading::hourly(
            at(hour),
            HumiditySample {
                temperature: 22.5,
                relative_humidity: 45.0,
            },
            PressureSample {
                temperature: 23.0,
                millibars: 1012.3,
            },
        )
    }

    fn fast(hour: u32) -> Reading {
        Reading::fast(
            at(hour),
            350.0,
            HumiditySample {
                temperature: 22.5,
                relative_humidity: 45.0,
            },
        )
    }

    fn temp_path(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("sensortag-{}-{name}", std::process::id()));
        let _ = std::fs::remove_file(&path);
        path
    }

    #[test]
    fn memory_sink_keeps_order() {
        let mut sink = MemorySink::new();
        assert_eq!(sink.insert_one(&hourly(1)).unwrap(), Ack { id: 1 });
        assert_eq!(sink.insert_one(&hourly(2)).unwrap(), Ack { id: 2 });
        assert_eq!(sink.records()[1].timestamp, at(2));
    }

    #[test]
    fn jsonl_rejects_duplicate_hourly_key_with_detail() {
        let path = temp_path("dup.jsonl");
        let mut sink = JsonLinesSink::open(&path, true).unwrap();
        sink.insert_one(&hourly(1)).unwrap();

        let err = sink.insert_one(&hourly(1)).unwrap_err();
        assert!(matches!(err, PersistenceError::DuplicateKey { ref key, .. } if key == "01/01/25 01:00:00"));
        assert!(err.details().unwrap().contains("Localtime"));

        // Leituras rápidas no mesmo segundo passam
        sink.insert_one(&fast(1)).unwrap();
        sink.insert_one(&fast(1)).unwrap();
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn jsonl_reopen_rebuilds_index() {
        let path = temp_path("reopen.jsonl");
        {
            let mut sink = JsonLinesSink::open(&path, true).unwrap();
            sink.insert_one(&hourly(3)).unwrap();
        }
        let mut sink = JsonLinesSink::open(&path, true).unwrap();
        assert!(sink.insert_one(&hourly(3)).is_err());
        assert_eq!(sink.insert_one(&hourly(4)).unwrap(), Ack { id: 2 });

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn jsonl_interrupted_write_costs_only_the_torn_record() {
        let path = temp_path("torn.jsonl");
        {
            let mut sink = JsonLinesSink::open(&path, true).unwrap();
            sink.insert_one(&hourly(8)).unwrap();
        }
        // Escrita interrompida no meio da linha seguinte
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(br#"{"Localtime":"01/01/25 09:0"#).unwrap();
        drop(file);

        let mut sink = JsonLinesSink::open(&path, true).unwrap();
        sink.insert_one(&hourly(10)).unwrap();
        drop(sink);

        let mut sink = JsonLinesSink::open(&path, true).unwrap();
        assert!(sink.insert_one(&hourly(8)).is_err());
        assert!(sink.insert_one(&hourly(10)).is_err());
        assert_eq!(sink.insert_one(&hourly(11)).unwrap(), Ack { id: 3 });

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.ends_with('\n'));
        assert_eq!(content.lines().count(), 4);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn jsonl_without_unique_index_accepts_duplicates() {
        let path = temp_path("nouniq.jsonl");
        let mut sink = JsonLinesSink::open(&path, false).unwrap();
        sink.insert_one(&hourly(5)).unwrap();
        assert!(sink.insert_one(&hourly(5)).is_ok());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn csv_writes_header_once() {
        let path = temp_path("mirror.csv");
        {
            let mut sink = CsvSink::open(&path).unwrap();
            sink.insert_one(&hourly(6)).unwrap();
        }
        let mut sink = CsvSink::open(&path).unwrap();
        sink.insert_one(&fast(7)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "2025-01-01 06:00:00,22.5,45,,1012.3,");
        assert_eq!(lines[2], "2025-01-01 07:00:00,22.5,45,350,,");
        let _ = std::fs::remove_file(&path);
    }
}
