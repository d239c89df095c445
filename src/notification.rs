//! Push notification support for out-of-band characteristic updates.
//!
//! A push source (for example a sensor that reports on change) delivers a
//! JSON body `{"characteristic": "...", "value": ...}` addressed to a
//! notification ID. Accessories register a handler for their ID with a
//! [`NotificationRegistry`]; [`NotificationHub`] is the in-process registry.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use log::debug;
use serde::Deserialize;
use serde_json::Value;

use crate::characteristic::Characteristic;
use crate::errors::Error;

type Result<T> = std::result::Result<T, Error>;

pub type NotificationHandler = Box<dyn Fn(Notification) + Send + Sync + 'static>;

/// A decoded push notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    CurrentAmbientLightLevel(f64),
    /// Names a characteristic this accessory does not expose.
    Unsupported { characteristic: String, value: Value },
}

#[derive(Debug, Deserialize)]
struct NotificationBody {
    characteristic: String,
    #[serde(default)]
    value: Value,
}

impl Notification {
    pub fn parse(body: &Value) -> Result<Self> {
        let body: NotificationBody = serde_json::from_value(body.clone())
            .map_err(|e| Error::InvalidNotification(e.to_string()))?;

        match Characteristic::from_str(&body.characteristic) {
            Ok(Characteristic::CurrentAmbientLightLevel) => body
                .value
                .as_f64()
                .map(Notification::CurrentAmbientLightLevel)
                .ok_or_else(|| {
                    Error::InvalidNotification(format!(
                        "value for {} must be a number, got {}",
                        body.characteristic, body.value
                    ))
                }),
            Err(_) => Ok(Notification::Unsupported {
                characteristic: body.characteristic,
                value: body.value,
            }),
        }
    }
}

/// Something accessories can register notification handlers with.
pub trait NotificationRegistry: Send + Sync {
    /// Route notifications for `id` to `handler`.
    ///
    /// Fails with [`Error::NotificationIdTaken`] if `id` already has a handler.
    fn register(
        &self,
        id: &str,
        handler: NotificationHandler,
        password: Option<&str>,
    ) -> Result<()>;
}

struct Subscription {
    password: Option<String>,
    handler: Arc<NotificationHandler>,
}

/// In-process notification registry and dispatcher.
#[derive(Default)]
pub struct NotificationHub {
    subscriptions: Mutex<HashMap<String, Subscription>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unregister(&self, id: &str) -> bool {
        self.subscriptions.lock().unwrap().remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver a notification body to the handler registered for `id`.
    ///
    /// When the handler was registered with a password, `password` must match.
    pub fn dispatch(&self, id: &str, password: Option<&str>, body: &Value) -> Result<()> {
        let handler = {
            let subscriptions = self.subscriptions.lock().unwrap();
            let subscription = subscriptions
                .get(id)
                .ok_or_else(|| Error::UnknownNotificationId(id.to_string()))?;
            if let Some(expected) = &subscription.password {
                if password != Some(expected.as_str()) {
                    return Err(Error::NotificationUnauthorized(id.to_string()));
                }
            }
            Arc::clone(&subscription.handler)
        };

        let notification = Notification::parse(body)?;
        debug!("Dispatching notification for '{}': {:?}", id, notification);
        handler(notification);
        Ok(())
    }

    /// Like [`NotificationHub::dispatch`], for a raw JSON body.
    pub fn dispatch_str(&self, id: &str, password: Option<&str>, body: &str) -> Result<()> {
        let body: Value = serde_json::from_str(body).map_err(Error::JsonLoad)?;
        self.dispatch(id, password, &body)
    }
}

impl NotificationRegistry for NotificationHub {
    fn register(
        &self,
        id: &str,
        handler: NotificationHandler,
        password: Option<&str>,
    ) -> Result<()> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        if subscriptions.contains_key(id) {
            return Err(Error::NotificationIdTaken(id.to_string()));
        }
        subscriptions.insert(
            id.to_string(),
            Subscription {
                password: password.map(String::from),
                handler: Arc::new(handler),
            },
        );
        Ok(())
    }
}

impl std::fmt::Debug for NotificationHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let subscriptions = self.subscriptions.lock().unwrap();
        f.debug_struct("NotificationHub")
            .field("ids", &subscriptions.keys().collect::<Vec<_>>())
            .finish()
    }
}
