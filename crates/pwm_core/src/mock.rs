//!A bus that needs no hardware.
//!
//! `MockTransport` accepts every write and answers every read with zeros (or with a value preset for that register).
//! Every call lands in an `EventLog`, which `MockDelay` can share so the full sequence of bus traffic and waits can be
//! inspected afterwards.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use tracing::{debug, info};

use crate::{delay::Delay, error::TransportError, transport::Transport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Read { register: u8, length: u32 },
    Write { register: u8, bytes: Vec<u8> },
    Delay(Duration),
}

///Shared, ordered record of bus events.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<BusEvent>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: BusEvent) {
        lock(&self.events).push(event);
    }

    pub fn events(&self) -> Vec<BusEvent> {
        lock(&self.events).clone()
    }

    ///Only the writes, as `(register, bytes)` pairs.
    pub fn writes(&self) -> Vec<(u8, Vec<u8>)> {
        lock(&self.events)
            .iter()
            .filter_map(|event| match event {
                BusEvent::Write { register, bytes } => Some((*register, bytes.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }
}

pub struct MockTransport {
    log: EventLog,
    registers: Mutex<HashMap<u8, u8>>,
    log_writes: bool,
}

impl MockTransport {
    pub fn new(log_writes: bool) -> Self {
        Self::with_log(EventLog::new(), log_writes)
    }

    pub fn with_log(log: EventLog, log_writes: bool) -> Self {
        Self {
            log,
            registers: Mutex::new(HashMap::new()),
            log_writes,
        }
    }

    ///Make reads of `register` answer `value` instead of zero. Writes never change this value.
    pub fn preset(&self, register: u8, value: u8) {
        lock(&self.registers).insert(register, value);
    }

    pub fn log(&self) -> EventLog {
        self.log.clone()
    }
}

impl Transport for MockTransport {
    async fn read(&self, register: u8, length: u32) -> Result<Vec<u8>, TransportError> {
        self.log.push(BusEvent::Read { register, length });
        let registers = lock(&self.registers);
        let bytes = (0..length)
            .map(|offset| {
                let addr = register.wrapping_add(offset as u8);
                registers.get(&addr).copied().unwrap_or(0)
            })
            .collect();
        Ok(bytes)
    }

    async fn write(&self, register: u8, bytes: &[u8]) -> Result<(), TransportError> {
        if self.log_writes {
            info!(
                "mock write register: 0x{:02x} ({}) bytes: {:02x?} {:?}",
                register, register, bytes, bytes
            );
        }
        self.log.push(BusEvent::Write {
            register,
            bytes: bytes.to_vec(),
        });
        Ok(())
    }
}

///Returns immediately, noting the requested wait in an optional `EventLog`.
#[derive(Debug, Clone, Default)]
pub struct MockDelay {
    log: Option<EventLog>,
}

impl MockDelay {
    pub fn new() -> Self {
        Self { log: None }
    }

    pub fn with_log(log: EventLog) -> Self {
        Self { log: Some(log) }
    }
}

impl Delay for MockDelay {
    async fn sleep(&self, duration: Duration) {
        debug!("mock delay of {:?} skipped", duration);
        if let Some(ref log) = self.log {
            log.push(BusEvent::Delay(duration));
        }
    }
}
