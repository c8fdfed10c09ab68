//! # SensorTag Sender
//!
//! Lê o TI CC2650 SensorTag e relaya as leituras via MQTT.
//!
//! ## Uso
//! ```bash
//! sensortag_sender                     # Relay horário (umidade + pressão)
//! sensortag_sender --poll              # Polling rápido (lux + umidade, bateria a cada 15 min)
//! sensortag_sender --config cfg.toml   # Config alternativa
//! ```

mod mqtt;
mod publisher;
mod scheduler;

use mqtt::MqttPublisher;
use publisher::RelayPublisher;
use scheduler::PollingScheduler;
use sensortag_core::channel::Publisher;
use sensortag_core::clock::{CancelToken, SystemClock};
use sensortag_core::config::AppConfig;
use sensortag_core::peripheral::{PeripheralConnector, SimulatedConnector};
use sensortag_core::protocol::encode_reading;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Relay,
    Poll,
}

fn main() -> ExitCode {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Argumentos ──
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mode = if args.iter().any(|a| a == "--poll") {
        Mode::Poll
    } else {
        Mode::Relay
    };
    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .unwrap_or_else(AppConfig::default_path);

    // ── Carregar config ──
    let config = AppConfig::load(&config_path);

    // Salva config padrão se não existir
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

    // ── Periférico ──
    let tag = match SimulatedConnector.connect(&config.device.address) {
        Ok(tag) => tag,
        Err(e) => {
            error!("Falha ao conectar em {}: {e}", config.device.address);
            return ExitCode::FAILURE;
        }
    };

    // ── Broker ──
    let client_id = format!("{}-sender", config.broker.client_id);
    let broker = match MqttPublisher::connect(&config.broker, &client_id) {
        Ok(broker) => broker,
        Err(e) => {
            error!("Falha ao iniciar cliente MQTT: {e}");
            return ExitCode::FAILURE;
        }
    };

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   📡 SENSORTAG SENDER – ATIVO");
    println!("══════════════════════════════════════════════");
    println!("  SensorTag: {}", config.device.address);
    println!("  Broker:    {}:{}", config.broker.host, config.broker.port);
    match mode {
        Mode::Relay => {
            println!("  Modo:      relay horário → {}", config.publisher.topic);
            println!("  Intervalo: {:.0}s", config.publisher.interval_secs);
        }
        Mode::Poll => {
            println!("  Modo:      polling rápido → {}", config.poller.publish_topic);
            println!("  Tick:      {}ms", config.poller.fast_interval_ms);
        }
    }
    println!("══════════════════════════════════════════════");
    println!();

    let clock = SystemClock::new();
    let cancel = CancelToken::new();

    // ── Loop principal ──
    let result = match mode {
        Mode::Relay => {
            let mut relay = RelayPublisher::new(&broker, &tag, &clock, &config.publisher);
            relay.run(&cancel).map(|_| ()).map_err(|e| e.to_string())
        }
        Mode::Poll => {
            let topic = config.poller.publish_topic.as_str();
            let mut scheduler = PollingScheduler::new(&tag, &clock, &config.poller);
            scheduler
                .run(&cancel, |reading| {
                    info!("{reading}");
                    if topic.is_empty() {
                        return;
                    }
                    let sent = encode_reading(reading)
                        .map_err(|e| e.to_string())
                        .and_then(|payload| broker.publish(topic, &payload).map_err(|e| e.to_string()));
                    if let Err(e) = sent {
                        warn!("Leitura rápida não publicada em {topic}: {e}");
                    }
                })
                .map(|_| ())
                .map_err(|e| e.to_string())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Pipeline encerrado: {e}");
            ExitCode::FAILURE
        }
    }
}
