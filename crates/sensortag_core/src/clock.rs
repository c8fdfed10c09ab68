//! Relógio e cancelamento dos loops de agendamento.
//!
//! Os loops nunca chamam `std::thread::sleep` direto: passam por um
//! [`Clock`], o que permite rodar N ticks com tempo simulado nos testes.

use chrono::{Local, NaiveDateTime, TimeDelta, Timelike};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Fonte de tempo dos loops.
pub trait Clock {
    /// Tempo monotônico desde a criação do relógio.
    fn elapsed(&self) -> Duration;

    fn sleep(&self, duration: Duration);

    /// Hora local de parede, truncada em segundos.
    fn now_local(&self) -> NaiveDateTime;
}

/// Relógio real do sistema.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn now_local(&self) -> NaiveDateTime {
        let now = Local::now().naive_local();
        now.with_nanosecond(0).unwrap_or(now)
    }
}

// ──────────────────────────────────────────────
// Relógio manual (testes e simulação)
// ──────────────────────────────────────────────

#[derive(Debug)]
struct ManualState {
    elapsed: Duration,
    wall: NaiveDateTime,
    sleeps: Vec<Duration>,
}

/// Relógio controlado manualmente: `sleep` só avança o tempo simulado.
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<ManualState>,
}

impl ManualClock {
    pub fn starting_at(wall: NaiveDateTime) -> Self {
        Self {
            state: Mutex::new(ManualState {
                elapsed: Duration::ZERO,
                wall,
                sleeps: Vec::new(),
            }),
        }
    }

    /// Avança o tempo sem registrar um sleep (simula trabalho).
    pub fn advance(&self, duration: Duration) {
        let mut state = self.lock();
        state.elapsed += duration;
        state.wall = shift(state.wall, duration);
    }

    /// Sleeps pedidos até agora, em ordem.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn shift(wall: NaiveDateTime, duration: Duration) -> NaiveDateTime {
    TimeDelta::from_std(duration)
        .ok()
        .and_then(|delta| wall.checked_add_signed(delta))
        .unwrap_or(wall)
}

impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        self.lock().elapsed
    }

    fn sleep(&self, duration: Duration) {
        let mut state = self.lock();
        state.sleeps.push(duration);
        state.elapsed += duration;
        state.wall = shift(state.wall, duration);
    }

    fn now_local(&self) -> NaiveDateTime {
        let wall = self.lock().wall;
        wall.with_nanosecond(0).unwrap_or(wall)
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn elapsed(&self) -> Duration {
        (**self).elapsed()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }

    fn now_local(&self) -> NaiveDateTime {
        (**self).now_local()
    }
}

// ──────────────────────────────────────────────
// Cancelamento
// ──────────────────────────────────────────────

/// Sinal de parada checado uma vez por tick.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn midnight() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap()
    }

    #[test]
    fn manual_clock_sleep_advances_time() {
        let clock = ManualClock::starting_at(midnight());
        clock.sleep(Duration::from_millis(1500));
        clock.advance(Duration::from_millis(600));

        assert_eq!(clock.elapsed(), Duration::from_millis(2100));
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(1500)]);
        // Hora de parede truncada em segundos
        assert_eq!(clock.now_local(), midnight() + TimeDelta::seconds(2));
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn system_clock_truncates_to_seconds() {
        assert_eq!(SystemClock::new().now_local().nanosecond(), 0);
    }
}
