//! Accessory configuration and URL property parsing.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{DurationMilliSeconds, formats::Flexible, serde_as};
use url::Url;

use crate::characteristic::CharacteristicProps;
use crate::errors::Error;

type Result<T> = std::result::Result<T, Error>;

/// Name the accessory is registered under in a Homebridge `config.json`.
pub const ACCESSORY_NAME: &str = "HttpAmbientLightSensor";

/// Default lower bound of the light level characteristic, in lux.
pub const MIN_LUX_VALUE: f64 = 0.0;

/// Default upper bound; the 16 bit range of a BH1750 sensor.
pub const MAX_LUX_VALUE: f64 = 65535.0;

/// Validated configuration of one light sensor accessory.
///
/// Built once with [`AccessoryConfig::from_value`] and never changed afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessoryConfig {
    pub name: String,
    pub get_url: UrlDescriptor,
    pub identify_url: Option<UrlDescriptor>,
    pub min_value: f64,
    pub max_value: f64,
    /// `None` when pulling is disabled (absent or zero).
    pub pull_interval: Option<Duration>,
    pub notification_id: Option<String>,
    pub notification_password: Option<String>,
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAccessoryConfig {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    get_url: Option<Value>,
    #[serde(default)]
    identify_url: Option<Value>,
    #[serde(default)]
    min_value: Option<f64>,
    #[serde(default)]
    max_value: Option<f64>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64, Flexible>>")]
    #[serde(default)]
    pull_interval: Option<Duration>,
    #[serde(rename = "notificationID", default)]
    notification_id: Option<String>,
    #[serde(default)]
    notification_password: Option<String>,
}

impl AccessoryConfig {
    /// Validate an accessory block from the host configuration.
    pub fn from_value(value: &Value) -> Result<Self> {
        let raw: RawAccessoryConfig =
            serde_json::from_value(value.clone()).map_err(Error::JsonLoad)?;

        let get_url = match raw.get_url.as_ref().filter(|v| is_set(v)) {
            Some(v) => parse_url_property("getUrl", v)?,
            None => return Err(Error::MissingProperty("getUrl")),
        };

        let identify_url = raw
            .identify_url
            .as_ref()
            .filter(|v| is_set(v))
            .map(|v| parse_url_property("identifyUrl", v))
            .transpose()?;

        let props = lux_bounds(raw.min_value, raw.max_value);
        if props.min_value > props.max_value {
            return Err(Error::InvalidBounds {
                min: props.min_value,
                max: props.max_value,
            });
        }

        Ok(AccessoryConfig {
            name: raw.name.unwrap_or_else(|| ACCESSORY_NAME.to_string()),
            get_url,
            identify_url,
            min_value: props.min_value,
            max_value: props.max_value,
            pull_interval: raw.pull_interval.filter(|d| !d.is_zero()),
            notification_id: raw.notification_id.filter(|id| !id.is_empty()),
            notification_password: raw.notification_password,
        })
    }
}

impl FromStr for AccessoryConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(s).map_err(Error::JsonLoad)?;
        Self::from_value(&value)
    }
}

/// Best-effort name of an accessory block, used before it has been validated.
pub fn configured_name(value: &Value) -> &str {
    value
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(ACCESSORY_NAME)
}

/// Best-effort light level bounds of an accessory block, used before it has
/// been validated. Falls back to the defaults when the bounds are unusable.
pub fn configured_bounds(value: &Value) -> CharacteristicProps {
    let props = lux_bounds(
        value.get("minValue").and_then(Value::as_f64),
        value.get("maxValue").and_then(Value::as_f64),
    );
    if props.min_value > props.max_value {
        return lux_bounds(None, None);
    }
    props
}

// A zero maxValue counts as unset.
fn lux_bounds(min_value: Option<f64>, max_value: Option<f64>) -> CharacteristicProps {
    CharacteristicProps {
        min_value: min_value.unwrap_or(MIN_LUX_VALUE),
        max_value: max_value.filter(|v| *v != 0.0).unwrap_or(MAX_LUX_VALUE),
    }
}

/// Collect the light sensor blocks from a full Homebridge `config.json`.
///
/// Entries may name the accessory plainly or prefixed with a plugin name
/// (`"some-plugin.HttpAmbientLightSensor"`).
pub fn accessories_from_homebridge_config(config: &Value) -> Vec<&Value> {
    config
        .get("accessories")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter(|entry| {
                    entry
                        .get("accessory")
                        .and_then(Value::as_str)
                        .is_some_and(|kind| {
                            kind == ACCESSORY_NAME
                                || kind.rsplit_once('.').is_some_and(|(_, k)| k == ACCESSORY_NAME)
                        })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Credentials for HTTP basic authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicAuth {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
}

/// A normalized request built from a URL property.
#[derive(Debug, Clone, PartialEq)]
pub struct UrlDescriptor {
    pub url: Url,
    /// Upper-cased method token.
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub auth: Option<BasicAuth>,
    /// When false, invalid TLS certificates are accepted.
    pub strict_ssl: bool,
    pub timeout: Option<Duration>,
}

impl UrlDescriptor {
    /// A plain GET to `url` with no extras.
    pub fn get(url: Url) -> Self {
        UrlDescriptor {
            url,
            method: "GET".to_string(),
            headers: BTreeMap::new(),
            body: None,
            auth: None,
            strict_ssl: false,
            timeout: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UrlObject {
    url: String,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    body: Option<Value>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    auth: Option<BasicAuth>,
    #[serde(rename = "strictSSL", default)]
    strict_ssl: bool,
    #[serde(default)]
    request_timeout: Option<u64>,
}

/// Turn a URL property (a string, or an object with a `url` field) into a
/// [`UrlDescriptor`].
///
/// `property` is only used to label errors.
pub fn parse_url_property(property: &'static str, value: &Value) -> Result<UrlDescriptor> {
    let object = match value {
        Value::String(url) => UrlObject {
            url: url.clone(),
            method: None,
            body: None,
            headers: BTreeMap::new(),
            auth: None,
            strict_ssl: false,
            request_timeout: None,
        },
        Value::Object(_) => serde_json::from_value::<UrlObject>(value.clone())
            .map_err(|e| Error::invalid_url(property, e))?,
        _ => {
            return Err(Error::invalid_url(
                property,
                "expected a URL string or an object with a 'url' field",
            ));
        }
    };

    let url = Url::parse(object.url.trim()).map_err(|e| Error::invalid_url(property, e))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::invalid_url(
            property,
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }

    let method = object
        .method
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or("GET")
        .to_ascii_uppercase();
    if !is_token(&method) {
        return Err(Error::invalid_url(property, format!("invalid method '{method}'")));
    }

    if let Some(name) = object.headers.keys().find(|name| !is_token(name)) {
        return Err(Error::invalid_url(property, format!("invalid header name '{name}'")));
    }

    let body = match object.body {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    };

    Ok(UrlDescriptor {
        url,
        method,
        headers: object.headers,
        body,
        auth: object.auth,
        strict_ssl: object.strict_ssl,
        timeout: object
            .request_timeout
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis),
    })
}

// HTTP token characters (RFC 9110, section 5.6.2).
fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}

fn is_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_config_defaults() {
        let config = AccessoryConfig::from_value(&json!({
            "name": "Office",
            "getUrl": "http://sensor.local/lux"
        }))
        .unwrap();

        assert_eq!(config.name, "Office");
        assert_eq!(config.get_url.url.as_str(), "http://sensor.local/lux");
        assert_eq!(config.get_url.method, "GET");
        assert!(config.identify_url.is_none());
        assert_eq!(config.min_value, 0.0);
        assert_eq!(config.max_value, 65535.0);
        assert!(config.pull_interval.is_none());
        assert!(config.notification_id.is_none());
    }

    #[test]
    fn test_full_config() {
        let config = AccessoryConfig::from_value(&json!({
            "name": "Garden",
            "getUrl": {
                "url": "https://sensor.local/lux",
                "method": "post",
                "headers": {"X-Token": "abc"},
                "auth": {"username": "admin", "password": "secret"},
                "body": {"read": "lux"},
                "strictSSL": true,
                "requestTimeout": 2500
            },
            "identifyUrl": "http://sensor.local/blink",
            "minValue": 1,
            "maxValue": 1000,
            "pullInterval": 5000,
            "notificationID": "garden-lux",
            "notificationPassword": "pw"
        }))
        .unwrap();

        assert_eq!(config.get_url.method, "POST");
        assert_eq!(config.get_url.headers.get("X-Token").map(String::as_str), Some("abc"));
        assert_eq!(config.get_url.auth.as_ref().unwrap().username, "admin");
        assert_eq!(config.get_url.body.as_deref(), Some(r#"{"read":"lux"}"#));
        assert!(config.get_url.strict_ssl);
        assert_eq!(config.get_url.timeout, Some(Duration::from_millis(2500)));
        assert_eq!(
            config.identify_url.unwrap().url.as_str(),
            "http://sensor.local/blink"
        );
        assert_eq!(config.min_value, 1.0);
        assert_eq!(config.max_value, 1000.0);
        assert_eq!(config.pull_interval, Some(Duration::from_millis(5000)));
        assert_eq!(config.notification_id.as_deref(), Some("garden-lux"));
        assert_eq!(config.notification_password.as_deref(), Some("pw"));
    }

    #[test]
    fn test_missing_get_url() {
        let err = AccessoryConfig::from_value(&json!({"name": "Office"})).unwrap_err();
        assert_eq!(err, Error::MissingProperty("getUrl"));

        let err = AccessoryConfig::from_value(&json!({"name": "Office", "getUrl": ""}))
            .unwrap_err();
        assert_eq!(err, Error::MissingProperty("getUrl"));
    }

    #[test]
    fn test_invalid_urls() {
        let err = AccessoryConfig::from_value(&json!({"getUrl": "not a url"})).unwrap_err();
        assert!(matches!(err, Error::InvalidUrl { property: "getUrl", .. }));

        let err = AccessoryConfig::from_value(&json!({"getUrl": "ftp://sensor.local/lux"}))
            .unwrap_err();
        assert!(err.to_string().contains("unsupported scheme"));

        let err = AccessoryConfig::from_value(&json!({
            "getUrl": "http://sensor.local/lux",
            "identifyUrl": {"method": "GET"}
        }))
        .unwrap_err();
        assert!(matches!(err, Error::InvalidUrl { property: "identifyUrl", .. }));

        let err = AccessoryConfig::from_value(&json!({"getUrl": 42})).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_invalid_method() {
        let err = parse_url_property(
            "getUrl",
            &json!({"url": "http://sensor.local", "method": "GE T"}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid method"));
    }

    #[test]
    fn test_zero_pull_interval_disables_pulling() {
        let config = AccessoryConfig::from_value(&json!({
            "getUrl": "http://sensor.local/lux",
            "pullInterval": 0
        }))
        .unwrap();
        assert!(config.pull_interval.is_none());
    }

    #[test]
    fn test_zero_max_value_falls_back_to_default() {
        let config = AccessoryConfig::from_value(&json!({
            "getUrl": "http://sensor.local/lux",
            "minValue": 0,
            "maxValue": 0
        }))
        .unwrap();
        assert_eq!(config.min_value, MIN_LUX_VALUE);
        assert_eq!(config.max_value, MAX_LUX_VALUE);
    }

    #[test]
    fn test_min_above_max_is_rejected() {
        let err = AccessoryConfig::from_value(&json!({
            "getUrl": "http://sensor.local/lux",
            "minValue": 500,
            "maxValue": 100
        }))
        .unwrap_err();
        assert_eq!(err, Error::InvalidBounds { min: 500.0, max: 100.0 });
        assert!(err.is_config());
    }

    #[test]
    fn test_configured_bounds() {
        let props = configured_bounds(&json!({"minValue": 2, "maxValue": 800}));
        assert_eq!((props.min_value, props.max_value), (2.0, 800.0));

        let props = configured_bounds(&json!({"minValue": "low", "maxValue": 0}));
        assert_eq!((props.min_value, props.max_value), (MIN_LUX_VALUE, MAX_LUX_VALUE));

        let props = configured_bounds(&json!({"minValue": 900, "maxValue": 10}));
        assert_eq!((props.min_value, props.max_value), (MIN_LUX_VALUE, MAX_LUX_VALUE));
    }

    #[test]
    fn test_from_str() {
        let config: AccessoryConfig =
            r#"{"name": "Hall", "getUrl": "http://10.0.0.2/lux"}"#.parse().unwrap();
        assert_eq!(config.name, "Hall");
        assert!(matches!(
            "{".parse::<AccessoryConfig>(),
            Err(Error::JsonLoad(_))
        ));
    }

    #[test]
    fn test_accessories_from_homebridge_config() {
        let config = json!({
            "bridge": {"name": "Homebridge"},
            "accessories": [
                {"accessory": "HttpAmbientLightSensor", "name": "A", "getUrl": "http://a"},
                {"accessory": "HttpTemperature", "name": "B"},
                {"accessory": "homebridge-http-ambient-light-sensor.HttpAmbientLightSensor", "name": "C"}
            ]
        });

        let names: Vec<&str> = accessories_from_homebridge_config(&config)
            .into_iter()
            .map(configured_name)
            .collect();
        assert_eq!(names, vec!["A", "C"]);
        assert!(accessories_from_homebridge_config(&json!({})).is_empty());
    }
}
