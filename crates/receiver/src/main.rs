//! # SensorTag Receiver
//!
//! Assina os tópicos de telemetria no broker MQTT, valida cada mensagem e
//! persiste as leituras no sink configurado (JSON Lines ou CSV).
//!
//! ## Uso
//! ```bash
//! sensortag_receiver                     # Config ao lado do executável
//! sensortag_receiver --config cfg.toml   # Config alternativa
//! ```

mod net_thread;
mod relay;

use relay::RelaySubscriber;
use sensortag_core::clock::CancelToken;
use sensortag_core::config::{AppConfig, StoreFormat};
use sensortag_core::storage::{CsvSink, JsonLinesSink, PersistenceError, StorageSink};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};

fn open_sink(format: StoreFormat, path: &Path, unique_hourly: bool) -> Result<Box<dyn StorageSink>, PersistenceError> {
    Ok(match format {
        StoreFormat::Jsonl => Box::new(JsonLinesSink::open(path, unique_hourly)?),
        StoreFormat::Csv => Box::new(CsvSink::open(path)?),
    })
}

fn main() -> ExitCode {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Config ──
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load(&config_path);

    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!("Config inválida: {e}");
        }
        return ExitCode::from(2);
    }

    let rc = &config.receiver;

    // ── Sink (aberto uma vez, compartilhado por todas as inserções) ──
    let store_path = PathBuf::from(&rc.store_path);
    let sink = match open_sink(rc.store_format, &store_path, rc.unique_hourly) {
        Ok(sink) => sink,
        Err(e) => {
            error!("Falha ao abrir sink {}: {e}", store_path.display());
            return ExitCode::FAILURE;
        }
    };

    // ── Thread de rede ──
    let client_id = format!("{}-receiver", config.broker.client_id);
    let mut subscription =
        match net_thread::spawn_subscription_thread(&config.broker, &client_id, &rc.topic_pattern, rc.queue_capacity) {
            Ok(rx) => rx,
            Err(e) => {
                error!("Falha ao iniciar assinatura: {e}");
                return ExitCode::FAILURE;
            }
        };

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   🗄  SENSORTAG RECEIVER – ATIVO");
    println!("══════════════════════════════════════════════");
    println!("  Broker:    {}:{}", config.broker.host, config.broker.port);
    println!("  Padrão:    {}", rc.topic_pattern);
    println!("  Destino:   {} ({:?})", store_path.display(), rc.store_format);
    println!("══════════════════════════════════════════════");
    println!();
    info!("Aguardando mensagens em {}", rc.topic_pattern);

    // ── Loop principal ──
    let mut relay = RelaySubscriber::new(sink);
    match relay.run(&mut subscription, &CancelToken::new(), rc.poll_timeout()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Assinatura perdida: {e}");
            ExitCode::FAILURE
        }
    }
}
