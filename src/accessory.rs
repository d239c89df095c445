//! The HTTP ambient light sensor accessory.

use std::sync::Arc;

use futures::FutureExt;
use log::{debug, error, info, warn};
use serde_json::Value;

use crate::characteristic::{
    AccessoryInformation, Characteristic, CharacteristicProps, LightSensorService, Service, Ticket,
};
use crate::config::{AccessoryConfig, UrlDescriptor, configured_bounds, configured_name};
use crate::errors::Error;
use crate::http::HttpExecutor;
use crate::notification::{Notification, NotificationRegistry};
use crate::pull_timer::{PullFn, PullTimer, PushFn, TimerReset};

type Result<T> = std::result::Result<T, Error>;

/// Issues the configured GET and turns the answer into a reading.
struct SensorReader<E> {
    name: String,
    executor: Arc<E>,
    get_url: UrlDescriptor,
    level_source: Arc<LightSensorService>,
    timer_reset: Option<TimerReset>,
}

impl<E: HttpExecutor> SensorReader<E> {
    async fn read(&self) -> Result<(Ticket, f64)> {
        let ticket = self.level_source.level().ticket();
        let result = self.executor.execute(&self.get_url).await;

        // Any read, whatever its outcome, postpones the next scheduled pull.
        if let Some(reset) = &self.timer_reset {
            reset.reset();
        }

        let response = result.inspect_err(|e| {
            error!("[{}] getSensorValue() failed: {}", self.name, e);
        })?;

        if response.status != 200 {
            error!(
                "[{}] getSensorValue() returned http error: {}",
                self.name, response.status
            );
            return Err(Error::HttpStatus(response.status));
        }

        let value = parse_lux(&response.body).inspect_err(|e| {
            error!("[{}] getSensorValue() {}", self.name, e);
        })?;
        info!("[{}] Get sensor value: {}", self.name, value);
        Ok((ticket, value))
    }
}

fn parse_lux(body: &str) -> Result<f64> {
    body.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| Error::Parse {
            body: body.to_string(),
        })
}

fn apply_notification(name: &str, service: &LightSensorService, notification: Notification) -> bool {
    match notification {
        Notification::CurrentAmbientLightLevel(value) => {
            debug!(
                "[{}] Update received from device: {}: {}",
                name,
                Characteristic::CurrentAmbientLightLevel,
                value
            );
            service.level().set(value)
        }
        Notification::Unsupported { characteristic, .. } => {
            warn!(
                "[{}] Encountered unknown characteristic handling notification: {}",
                name, characteristic
            );
            false
        }
    }
}

/// A light sensor whose lux level is read over HTTP.
///
/// Reads happen on demand through [`get_sensor_value`](Self::get_sensor_value)
/// and, with a `pullInterval`, periodically in a background task. Push
/// notifications update the level without any HTTP traffic.
///
/// The level characteristic keeps the most recently *dispatched* reading:
/// a slow request cannot overwrite a value from a request started after it,
/// or from a notification received after it was sent.
pub struct HttpAmbientLightSensor<E: HttpExecutor> {
    config: AccessoryConfig,
    executor: Arc<E>,
    reader: Arc<SensorReader<E>>,
    information: AccessoryInformation,
    service: Arc<LightSensorService>,
    pull_timer: Option<PullTimer>,
    registry: Option<Arc<dyn NotificationRegistry>>,
}

impl<E: HttpExecutor> HttpAmbientLightSensor<E> {
    /// Build the accessory from a validated configuration.
    ///
    /// # Panics
    ///
    /// With a pull interval configured this spawns the pull task, so it
    /// panics when called outside a tokio runtime.
    pub fn new(
        config: AccessoryConfig,
        executor: Arc<E>,
        registry: Option<Arc<dyn NotificationRegistry>>,
    ) -> Self {
        let service = Arc::new(LightSensorService::new(
            &config.name,
            CharacteristicProps {
                min_value: config.min_value,
                max_value: config.max_value,
            },
        ));

        let mut pull_timer = config.pull_interval.map(PullTimer::new);

        let reader = Arc::new(SensorReader {
            name: config.name.clone(),
            executor: Arc::clone(&executor),
            get_url: config.get_url.clone(),
            level_source: Arc::clone(&service),
            timer_reset: pull_timer.as_ref().map(PullTimer::reset_handle),
        });
        service.attach_get_handler();

        if let Some(timer) = pull_timer.as_mut() {
            let pull_reader = Arc::clone(&reader);
            let pull: PullFn<(Ticket, f64)> = Box::new(move || {
                let reader = Arc::clone(&pull_reader);
                async move { reader.read().await }.boxed()
            });
            let push_service = Arc::clone(&service);
            let push: PushFn<(Ticket, f64)> = Box::new(move |(ticket, value): (Ticket, f64)| {
                push_service.level().apply(ticket, value);
            });
            timer.start(pull, push);
            debug!(
                "[{}] Pulling every {:?}",
                config.name,
                timer.interval()
            );
        }

        HttpAmbientLightSensor {
            information: AccessoryInformation::from_package(&config.name),
            config,
            executor,
            reader,
            service,
            pull_timer,
            registry,
        }
    }

    /// Validate an accessory block and build the accessory.
    ///
    /// Configuration errors are logged before they are returned.
    pub fn from_value(
        config: &Value,
        executor: Arc<E>,
        registry: Option<Arc<dyn NotificationRegistry>>,
    ) -> Result<Self> {
        match AccessoryConfig::from_value(config) {
            Ok(config) => Ok(Self::new(config, executor, registry)),
            Err(e) => {
                let name = configured_name(config);
                error!("[{}] {}", name, e);
                error!("[{}] Aborting...", name);
                Err(e)
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &AccessoryConfig {
        &self.config
    }

    pub fn light_sensor(&self) -> &Arc<LightSensorService> {
        &self.service
    }

    pub fn is_pulling(&self) -> bool {
        self.pull_timer.as_ref().is_some_and(PullTimer::is_running)
    }

    /// Read the sensor over HTTP and store the reading.
    ///
    /// Returns the level held by the characteristic afterwards. That is this
    /// reading unless a newer one was stored while the request was in flight,
    /// and it is bounded by the configured min/max.
    pub async fn get_sensor_value(&self) -> Result<f64> {
        let (ticket, value) = self.reader.read().await?;
        let level = self.service.level();
        level.apply(ticket, value);
        Ok(level.value())
    }

    /// Serve a host read of `characteristic`.
    pub async fn read(&self, characteristic: Characteristic) -> Result<f64> {
        match characteristic {
            Characteristic::CurrentAmbientLightLevel => self.get_sensor_value().await,
        }
    }

    /// Run the identify request, if one is configured.
    pub async fn identify(&self) -> Result<()> {
        info!("[{}] Identify requested", self.config.name);

        let Some(identify_url) = &self.config.identify_url else {
            return Ok(());
        };

        let response = self
            .executor
            .execute(identify_url)
            .await
            .inspect_err(|e| error!("[{}] identify() failed: {}", self.config.name, e))?;

        if response.status != 200 {
            error!(
                "[{}] identify() returned http error: {}",
                self.config.name, response.status
            );
            return Err(Error::HttpStatus(response.status));
        }
        Ok(())
    }

    /// Apply a push notification. Returns whether the level changed.
    pub fn handle_notification(&self, notification: Notification) -> bool {
        apply_notification(&self.config.name, &self.service, notification)
    }

    /// Register for push notifications once the host has started.
    ///
    /// Does nothing without a registry or a `notificationID`. A failed
    /// registration (usually an ID shared by several accessories) is only
    /// logged at debug level.
    pub fn did_finish_launching(&self) {
        let (Some(registry), Some(id)) = (&self.registry, &self.config.notification_id) else {
            return;
        };

        let name = self.config.name.clone();
        let service = Arc::clone(&self.service);
        let result = registry.register(
            id,
            Box::new(move |notification| {
                apply_notification(&name, &service, notification);
            }),
            self.config.notification_password.as_deref(),
        );

        match result {
            Ok(()) => debug!(
                "[{}] Registered for notifications as '{}'",
                self.config.name, id
            ),
            Err(e) => debug!(
                "[{}] Notification registration skipped: {}",
                self.config.name, e
            ),
        }
    }

    /// Accessory information followed by the light sensor service.
    pub fn services(&self) -> Vec<Service> {
        vec![
            Service::AccessoryInformation(self.information.clone()),
            Service::LightSensor(Arc::clone(&self.service)),
        ]
    }
}

impl<E: HttpExecutor> std::fmt::Debug for HttpAmbientLightSensor<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAmbientLightSensor")
            .field("config", &self.config)
            .field("service", &self.service)
            .field("pull_timer", &self.pull_timer)
            .finish_non_exhaustive()
    }
}

/// Stand-in for an accessory whose configuration was rejected.
///
/// It still advertises a light sensor so the host's accessory layout stays
/// stable, but nothing reads the sensor. The sensor's bounds are whatever the
/// rejected block set, as far as they can be read.
#[derive(Debug)]
pub struct DisabledAccessory {
    information: AccessoryInformation,
    service: Arc<LightSensorService>,
    reason: Error,
}

impl DisabledAccessory {
    pub fn new(name: &str, props: CharacteristicProps, reason: Error) -> Self {
        DisabledAccessory {
            information: AccessoryInformation::from_package(name),
            service: Arc::new(LightSensorService::new(name, props)),
            reason,
        }
    }

    pub fn name(&self) -> &str {
        &self.information.name
    }

    pub fn reason(&self) -> &Error {
        &self.reason
    }

    pub fn services(&self) -> Vec<Service> {
        vec![
            Service::AccessoryInformation(self.information.clone()),
            Service::LightSensor(Arc::clone(&self.service)),
        ]
    }
}

/// What the registration layer hands to the host for one config block.
#[derive(Debug)]
pub enum Accessory<E: HttpExecutor> {
    Ready(HttpAmbientLightSensor<E>),
    Disabled(DisabledAccessory),
}

impl<E: HttpExecutor> Accessory<E> {
    /// Build an accessory, degrading to [`Accessory::Disabled`] on a bad config.
    pub fn register(
        config: &Value,
        executor: Arc<E>,
        registry: Option<Arc<dyn NotificationRegistry>>,
    ) -> Self {
        match HttpAmbientLightSensor::from_value(config, executor, registry) {
            Ok(sensor) => Accessory::Ready(sensor),
            Err(e) => Accessory::Disabled(DisabledAccessory::new(
                configured_name(config),
                configured_bounds(config),
                e,
            )),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Accessory::Ready(sensor) => sensor.name(),
            Accessory::Disabled(stub) => stub.name(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Accessory::Ready(_))
    }

    pub fn services(&self) -> Vec<Service> {
        match self {
            Accessory::Ready(sensor) => sensor.services(),
            Accessory::Disabled(stub) => stub.services(),
        }
    }

    pub async fn read(&self, characteristic: Characteristic) -> Result<f64> {
        match self {
            Accessory::Ready(sensor) => sensor.read(characteristic).await,
            Accessory::Disabled(stub) => Err(Error::disabled(stub.name(), stub.reason())),
        }
    }

    pub async fn identify(&self) -> Result<()> {
        match self {
            Accessory::Ready(sensor) => sensor.identify().await,
            Accessory::Disabled(stub) => {
                info!("[{}] Identify requested", stub.name());
                Ok(())
            }
        }
    }

    pub fn did_finish_launching(&self) {
        if let Accessory::Ready(sensor) = self {
            sensor.did_finish_launching();
        }
    }
}
