//! The slice of the HomeKit service model this accessory exposes.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Characteristics this accessory knows by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display)]
pub enum Characteristic {
    CurrentAmbientLightLevel,
}

/// Bounds advertised for a numeric characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacteristicProps {
    pub min_value: f64,
    pub max_value: f64,
}

impl CharacteristicProps {
    /// Clamp `value` into the advertised range.
    pub fn clamp(&self, value: f64) -> f64 {
        // f64::clamp panics on min > max, so do it by hand.
        value.max(self.min_value).min(self.max_value)
    }
}

/// Position of a write in dispatch order.
///
/// Taken when a read is started, so a slow request that finishes late
/// cannot overwrite a value that was dispatched after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

pub type ValueCallback = Arc<dyn Fn(f64) + Send + Sync + 'static>;

#[derive(Debug)]
struct LevelState {
    value: f64,
    applied: u64,
}

/// The `CurrentAmbientLightLevel` characteristic.
pub struct LevelCharacteristic {
    props: CharacteristicProps,
    state: Mutex<LevelState>,
    // Held from store to the last subscriber call, so subscribers see
    // values in the order they were stored.
    dispatch: Mutex<()>,
    next_ticket: AtomicU64,
    subscribers: Mutex<Vec<ValueCallback>>,
}

impl std::fmt::Debug for LevelCharacteristic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LevelCharacteristic")
            .field("props", &self.props)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl LevelCharacteristic {
    pub fn new(props: CharacteristicProps) -> Self {
        LevelCharacteristic {
            props,
            state: Mutex::new(LevelState {
                value: props.min_value,
                applied: 0,
            }),
            dispatch: Mutex::new(()),
            next_ticket: AtomicU64::new(0),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn props(&self) -> CharacteristicProps {
        self.props
    }

    pub fn value(&self) -> f64 {
        self.state.lock().unwrap().value
    }

    /// Reserve a slot in write order.
    pub fn ticket(&self) -> Ticket {
        Ticket(self.next_ticket.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Store `value` unless something dispatched later was already stored.
    ///
    /// Returns whether the value was applied. Subscribers are called with the
    /// clamped value in the same order values are stored. A subscriber may
    /// read the value or subscribe, but must not call [`apply`](Self::apply)
    /// or [`set`](Self::set) on the same characteristic.
    pub fn apply(&self, ticket: Ticket, value: f64) -> bool {
        let clamped = self.props.clamp(value);
        if clamped != value {
            warn!(
                "{} value {} is outside [{}, {}], using {}",
                Characteristic::CurrentAmbientLightLevel,
                value,
                self.props.min_value,
                self.props.max_value,
                clamped
            );
        }

        let _dispatch = self.dispatch.lock().unwrap();
        {
            let mut state = self.state.lock().unwrap();
            if ticket.0 <= state.applied {
                debug!(
                    "Dropping stale {} write #{} (last applied #{})",
                    Characteristic::CurrentAmbientLightLevel,
                    ticket.0,
                    state.applied
                );
                return false;
            }
            state.value = clamped;
            state.applied = ticket.0;
        }

        let subscribers = self.subscribers.lock().unwrap().clone();
        for callback in subscribers {
            callback(clamped);
        }
        true
    }

    /// Take a ticket and apply immediately.
    pub fn set(&self, value: f64) -> bool {
        let ticket = self.ticket();
        self.apply(ticket, value)
    }

    /// Call `callback` with every applied value.
    pub fn subscribe<F: Fn(f64) + Send + Sync + 'static>(&self, callback: F) {
        self.subscribers.lock().unwrap().push(Arc::new(callback));
    }
}

/// A light sensor service with its single level characteristic.
#[derive(Debug)]
pub struct LightSensorService {
    name: String,
    level: LevelCharacteristic,
    get_handler: AtomicBool,
}

impl LightSensorService {
    pub fn new(name: &str, props: CharacteristicProps) -> Self {
        LightSensorService {
            name: name.to_string(),
            level: LevelCharacteristic::new(props),
            get_handler: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn characteristic(&self, characteristic: Characteristic) -> &LevelCharacteristic {
        match characteristic {
            Characteristic::CurrentAmbientLightLevel => &self.level,
        }
    }

    pub fn level(&self) -> &LevelCharacteristic {
        &self.level
    }

    /// Whether reads of the level are served by a live get handler.
    pub fn has_get_handler(&self) -> bool {
        self.get_handler.load(Ordering::SeqCst)
    }

    pub(crate) fn attach_get_handler(&self) {
        self.get_handler.store(true, Ordering::SeqCst);
    }
}

/// Static identity of the accessory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccessoryInformation {
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
    pub firmware_revision: String,
}

impl AccessoryInformation {
    pub const SERIAL_NUMBER: &'static str = "001";

    /// Identity taken from this crate's package metadata.
    pub fn from_package(name: &str) -> Self {
        // First author, without an email address.
        let manufacturer = env!("CARGO_PKG_AUTHORS")
            .split(':')
            .next()
            .and_then(|author| author.split('<').next())
            .map(str::trim)
            .unwrap_or_default();

        AccessoryInformation {
            name: name.to_string(),
            manufacturer: manufacturer.to_string(),
            model: env!("CARGO_PKG_NAME").to_string(),
            serial_number: Self::SERIAL_NUMBER.to_string(),
            firmware_revision: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// A service exposed to the host.
#[derive(Debug, Clone)]
pub enum Service {
    AccessoryInformation(AccessoryInformation),
    LightSensor(Arc<LightSensorService>),
}

impl Service {
    pub fn as_light_sensor(&self) -> Option<&Arc<LightSensorService>> {
        match self {
            Service::LightSensor(service) => Some(service),
            Service::AccessoryInformation(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use std::sync::atomic::AtomicUsize;

    fn props() -> CharacteristicProps {
        CharacteristicProps {
            min_value: 0.0,
            max_value: 1000.0,
        }
    }

    #[test]
    fn test_characteristic_names() {
        assert_eq!(
            Characteristic::from_str("CurrentAmbientLightLevel").unwrap(),
            Characteristic::CurrentAmbientLightLevel
        );
        assert!(Characteristic::from_str("CurrentRelativeHumidity").is_err());
        assert_eq!(
            Characteristic::CurrentAmbientLightLevel.to_string(),
            "CurrentAmbientLightLevel"
        );
    }

    #[test]
    fn test_initial_value_is_min() {
        let level = LevelCharacteristic::new(CharacteristicProps {
            min_value: 5.0,
            max_value: 10.0,
        });
        assert_eq!(level.value(), 5.0);
    }

    #[test]
    fn test_stale_write_is_dropped() {
        let level = LevelCharacteristic::new(props());
        let slow = level.ticket();
        let fast = level.ticket();

        assert!(level.apply(fast, 20.0));
        assert!(!level.apply(slow, 10.0));
        assert_eq!(level.value(), 20.0);
    }

    #[test]
    fn test_clamps_to_props() {
        let level = LevelCharacteristic::new(props());
        level.set(5000.0);
        assert_eq!(level.value(), 1000.0);
        level.set(-3.0);
        assert_eq!(level.value(), 0.0);
    }

    #[test]
    fn test_subscribers_see_applied_values() {
        let level = LevelCharacteristic::new(props());
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        level.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let stale = level.ticket();
        level.set(1.0);
        level.apply(stale, 2.0);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscribers_see_values_in_stored_order() {
        let level = Arc::new(LevelCharacteristic::new(props()));
        let last_seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&last_seen);
        level.subscribe(move |v| *sink.lock().unwrap() = Some(v));

        let writers: Vec<_> = (0..8)
            .map(|w| {
                let level = Arc::clone(&level);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        level.set((w * 100 + i % 100) as f64);
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        assert_eq!(*last_seen.lock().unwrap(), Some(level.value()));
    }

    #[test]
    fn test_subscriber_can_read_and_subscribe() {
        let level = Arc::new(LevelCharacteristic::new(props()));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let inner = Arc::clone(&level);
        let sink = Arc::clone(&seen);
        level.subscribe(move |v| {
            sink.lock().unwrap().push(inner.value());
            assert_eq!(inner.value(), v);
            let late = Arc::clone(&sink);
            inner.subscribe(move |v| late.lock().unwrap().push(-v));
        });

        level.set(3.0);
        level.set(4.0);
        assert_eq!(*seen.lock().unwrap(), vec![3.0, 4.0, -4.0]);
    }

    #[test]
    fn test_accessory_information_from_package() {
        let info = AccessoryInformation::from_package("Office");
        assert_eq!(info.name, "Office");
        assert_eq!(info.model, "http-ambient-light-sensor");
        assert_eq!(info.serial_number, "001");
        assert_eq!(info.firmware_revision, env!("CARGO_PKG_VERSION"));
        assert!(!info.manufacturer.contains('<'));
    }
}
