//! # http_ambient_light_sensor
//!
//! An ambient light sensor accessory whose lux level is read over HTTP, for
//! HomeKit bridges in the style of Homebridge.
//!
//! The accessory issues a request to a configured URL, parses the response
//! body as a lux value and stores it in the `CurrentAmbientLightLevel`
//! characteristic of a light sensor service. Readings can also be pulled on
//! a fixed interval or pushed by the sensor itself.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use serde_json::json;
//! use http_ambient_light_sensor::{Accessory, Characteristic, ReqwestExecutor};
//!
//! async fn read_lux() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = json!({
//!         "accessory": "HttpAmbientLightSensor",
//!         "name": "Office",
//!         "getUrl": "http://192.168.1.40/lux",
//!         "pullInterval": 60000
//!     });
//!
//!     let executor = Arc::new(ReqwestExecutor::new()?);
//!     let accessory = Accessory::register(&config, executor, None);
//!     let lux = accessory.read(Characteristic::CurrentAmbientLightLevel).await?;
//!     println!("{lux} lx");
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! | key                    | required | meaning                                         |
//! |------------------------|----------|-------------------------------------------------|
//! | `name`                 | no       | accessory name                                  |
//! | `getUrl`               | yes      | URL string or URL object returning the lux value |
//! | `identifyUrl`          | no       | URL called when the accessory is identified     |
//! | `minValue`/`maxValue`  | no       | characteristic bounds, default 0 and 65535      |
//! | `pullInterval`         | no       | milliseconds between background reads          |
//! | `notificationID`       | no       | ID to receive push notifications under          |
//! | `notificationPassword` | no       | password required on pushed notifications       |
//!
//! A URL object has the keys `url`, `method`, `body`, `headers`, `auth`
//! (`username`, `password`), `strictSSL` and `requestTimeout`.
//!
//! ## Feature Flags
//!
//! - `reqwest` (default): provide [`ReqwestExecutor`]. Without it, bring your
//!   own [`HttpExecutor`].

mod accessory;
mod characteristic;
mod config;
mod errors;
mod http;
pub mod notification;
pub mod pull_timer;

// Re-export public API
pub use accessory::{Accessory, DisabledAccessory, HttpAmbientLightSensor};
pub use characteristic::{
    AccessoryInformation, Characteristic, CharacteristicProps, LevelCharacteristic,
    LightSensorService, Service, Ticket,
};
pub use config::{
    ACCESSORY_NAME, AccessoryConfig, BasicAuth, MAX_LUX_VALUE, MIN_LUX_VALUE, UrlDescriptor,
    accessories_from_homebridge_config, configured_bounds, configured_name, parse_url_property,
};
pub use errors::Error;
#[cfg(feature = "reqwest")]
pub use http::ReqwestExecutor;
pub use http::{HttpExecutor, HttpResponse};
pub use notification::{Notification, NotificationHub, NotificationRegistry};
