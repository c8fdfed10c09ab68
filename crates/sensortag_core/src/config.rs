//! Configuração unificada via TOML.
//!
//! Um único `config.toml` ao lado do executável atende Sender e Receiver.
//! Seções ausentes usam os valores padrão.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::channel::{DEFAULT_PUBLISH_TOPIC, DEFAULT_SUBSCRIBE_PATTERN, validate_pattern};

/// Erros de leitura/gravação da configuração.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Erro de E/S em {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Erro ao parsear TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Erro ao serializar TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Periférico alvo.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// MAC do SensorTag (ou UUID do SO no macOS)
    pub address: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            address: "54:6C:0E:52:EF:53".into(),
        }
    }
}

/// Polling rápido (lux + umidade) e lento (bateria).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Intervalo do tick rápido (ms). Deve ficar logo abaixo do período
    /// de amostragem do sensor (100 ms).
    pub fast_interval_ms: u64,
    /// Intervalo de releitura da bateria (segundos)
    pub battery_interval_secs: u64,
    /// Tópico onde publicar cada leitura rápida (vazio = só log)
    pub publish_topic: String,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            fast_interval_ms: 80,
            battery_interval_secs: 15 * 60,
            publish_topic: "iot/fast".into(),
        }
    }
}

impl PollerConfig {
    pub fn fast_interval(&self) -> Duration {
        Duration::from_millis(self.fast_interval_ms)
    }

    pub fn battery_interval(&self) -> Duration {
        Duration::from_secs(self.battery_interval_secs)
    }
}

/// Relay horário.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    pub topic: String,
    /// Intervalo alvo entre inícios de ciclo (segundos)
    pub interval_secs: f64,
    /// Espera antes de ler os sensores recém-armados (segundos)
    pub warmup_secs: f64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            topic: DEFAULT_PUBLISH_TOPIC.into(),
            interval_secs: 3600.0,
            warmup_secs: 1.0,
        }
    }
}

impl PublisherConfig {
    pub fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.interval_secs.max(0.0)).unwrap_or(Duration::MAX)
    }

    pub fn warmup(&self) -> Duration {
        Duration::try_from_secs_f64(self.warmup_secs.max(0.0)).unwrap_or(Duration::ZERO)
    }
}

/// Conexão com o broker MQTT.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    /// Prefixo do client id (sufixo `-sender` / `-receiver`)
    pub client_id: String,
    pub keep_alive_secs: u64,
    /// Credenciais opcionais (vazio = anônimo). Nunca logadas.
    pub username: String,
    pub password: String,
    /// Capacidade da fila de requisições do cliente
    pub request_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: "sensortag".into(),
            keep_alive_secs: 30,
            username: String::new(),
            password: String::new(),
            request_capacity: 10,
        }
    }
}

/// Formato do sink do Receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreFormat {
    Jsonl,
    Csv,
}

/// Configuração do Receiver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    pub topic_pattern: String,
    pub store_path: String,
    pub store_format: StoreFormat,
    /// Índice único no `Localtime` das leituras horárias
    pub unique_hourly: bool,
    /// Buffer de mensagens entre a thread de rede e o relay
    pub queue_capacity: usize,
    /// Espera máxima por mensagem antes de checar cancelamento (ms)
    pub poll_timeout_ms: u64,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            topic_pattern: DEFAULT_SUBSCRIBE_PATTERN.into(),
            store_path: "readings.jsonl".into(),
            store_format: StoreFormat::Jsonl,
            unique_hourly: true,
            queue_capacity: 64,
            poll_timeout_ms: 1000,
        }
    }
}

impl ReceiverConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

/// Configuração raiz do aplicativo.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub device: DeviceConfig,
    pub poller: PollerConfig,
    pub publisher: PublisherConfig,
    pub broker: BrokerConfig,
    pub receiver: ReceiverConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML; cai no padrão em caso de erro.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match Self::try_load(path) {
                Ok(config) => {
                    info!("Configuração carregada de {}", path.display());
                    return config;
                }
                Err(e) => warn!("Erro ao carregar {}: {}", path.display(), e),
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    pub fn try_load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.device.address.trim().is_empty() {
            errors.push("Endereço do SensorTag não pode ser vazio".into());
        }
        if self.poller.fast_interval_ms == 0 {
            errors.push("Intervalo rápido não pode ser 0".into());
        }
        if self.poller.battery_interval() <= self.poller.fast_interval() {
            errors.push(format!(
                "Intervalo da bateria ({}s) deve ser maior que o tick rápido ({}ms)",
                self.poller.battery_interval_secs, self.poller.fast_interval_ms
            ));
        }
        if self.publisher.interval_secs.is_nan() || self.publisher.interval_secs <= 0.0 {
            errors.push(format!(
                "Intervalo do relay inválido: {}",
                self.publisher.interval_secs
            ));
        }
        if self.publisher.warmup_secs < 0.0 {
            errors.push("Warm-up não pode ser negativo".into());
        }
        for topic in [&self.publisher.topic, &self.poller.publish_topic] {
            if topic.contains(['+', '#']) {
                errors.push(format!("Tópico de publicação com curinga: {topic}"));
            }
        }
        if self.publisher.topic.is_empty() {
            errors.push("Tópico do relay não pode ser vazio".into());
        }
        if self.broker.port == 0 {
            errors.push("Porta do broker não pode ser 0".into());
        }
        if self.broker.request_capacity == 0 || self.receiver.queue_capacity == 0 {
            errors.push("Capacidades de fila devem ser > 0".into());
        }
        if let Err(e) = validate_pattern(&self.receiver.topic_pattern) {
            errors.push(e.to_string());
        }
        if self.receiver.store_path.trim().is_empty() {
            errors.push("Caminho do sink não pode ser vazio".into());
        }

        errors
    }
}
