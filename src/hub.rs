//! Home Assistant REST adapter: device registry and actuator.
//!
//! The device list combines two endpoints. `GET /api/services` says which
//! services each domain offers; `GET /api/states` lists the entities. Only
//! entities of supported domains (light, switch) become [`DeviceRecord`]s.
//! Actions are dispatched with `POST /api/services/{domain}/{service}`.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::action::{ActionRequest, ActionTarget, ActuationReceipt, Actuator};
use crate::device::{Capabilities, DeviceDomain, DeviceRecord, DeviceRegistry};
use crate::error::{ActuatorError, ActuatorResult, RegistryError, RegistryResult};

/// Color modes that imply dimmability.
const BRIGHTNESS_MODES: [&str; 7] = ["brightness", "color_temp", "hs", "xy", "rgb", "rgbw", "rgbww"];
/// Color modes that imply full color control.
const COLOR_MODES: [&str; 5] = ["hs", "xy", "rgb", "rgbw", "rgbww"];

/// Connection settings for a Home Assistant instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable holding the long-lived access token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://homeassistant.local:8123".into()
}
fn default_token_env() -> String {
    "HA_TOKEN".into()
}
fn default_timeout_secs() -> u64 {
    10
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_env: default_token_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl HubConfig {
    /// Read the access token from the configured environment variable.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env).ok().filter(|t| !t.trim().is_empty())
    }
}

// ── Wire types ──────────────────────────────────────────────────────────

/// One entry of `GET /api/services`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceDomain {
    pub domain: String,
    #[serde(default)]
    pub services: HashMap<String, serde_json::Value>,
}

/// One entry of `GET /api/states`.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

// ── Device list ─────────────────────────────────────────────────────────

/// Combine the hub's service catalogue and entity states into device records.
///
/// Entity order is preserved. An entity without a `friendly_name` is named
/// after its entity id.
pub fn build_device_list(services: &[ServiceDomain], states: &[EntityState]) -> Vec<DeviceRecord> {
    let mut actions: HashMap<DeviceDomain, BTreeSet<String>> = HashMap::new();
    for item in services {
        if let Some(domain) = DeviceDomain::from_name(&item.domain) {
            actions
                .entry(domain)
                .or_default()
                .extend(item.services.keys().cloned());
        }
    }

    states
        .iter()
        .filter_map(|entity| {
            let (prefix, _) = entity.entity_id.split_once('.')?;
            let domain = DeviceDomain::from_name(prefix)?;
            let name = entity
                .attributes
                .get("friendly_name")
                .and_then(|v| v.as_str())
                .unwrap_or(&entity.entity_id);

            let capabilities = match domain {
                DeviceDomain::Light => light_capabilities(&entity.attributes),
                DeviceDomain::Switch => Capabilities::default(),
            };
            Some(
                DeviceRecord::new(name, domain)
                    .with_entity_id(&entity.entity_id)
                    .with_actions(actions.get(&domain).cloned().unwrap_or_default())
                    .with_capabilities(capabilities),
            )
        })
        .collect()
}

/// Derive a light's capabilities from its `supported_color_modes`.
pub fn light_capabilities(attributes: &serde_json::Map<String, serde_json::Value>) -> Capabilities {
    let modes: Vec<&str> = attributes
        .get("supported_color_modes")
        .and_then(|v| v.as_array())
        .map(|modes| modes.iter().filter_map(|m| m.as_str()).collect())
        .unwrap_or_default();
    let supports = |wanted: &[&str]| modes.iter().any(|m| wanted.contains(m));
    let kelvin = |key: &str| {
        attributes
            .get(key)
            .and_then(|v| v.as_u64())
            .and_then(|k| u32::try_from(k).ok())
    };

    let mut caps = Capabilities::default();
    if supports(&BRIGHTNESS_MODES) {
        caps.can_set_brightness = true;
        if modes.contains(&"color_temp") {
            caps.can_set_color_temp = true;
            caps.min_temp_kelvin = kelvin("min_color_temp_kelvin");
            caps.max_temp_kelvin = kelvin("max_color_temp_kelvin");
        }
        caps.can_set_color = supports(&COLOR_MODES);
    }
    caps
}

/// Entity id of the device called exactly `name`. Later duplicates win.
pub fn resolve_entity_id<'a>(name: &str, devices: &'a [DeviceRecord]) -> Option<&'a str> {
    devices
        .iter()
        .filter(|d| d.name == name)
        .filter_map(|d| d.entity_id.as_deref())
        .last()
}

// ── HubClient ───────────────────────────────────────────────────────────

/// Blocking client for the Home Assistant REST API.
pub struct HubClient {
    config: HubConfig,
    token: String,
    agent: ureq::Agent,
    /// Device list from the most recent snapshot, for name-addressed actions.
    devices: Mutex<Option<Vec<DeviceRecord>>>,
}

impl HubClient {
    pub fn new(config: HubConfig, token: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();
        Self {
            config,
            token: token.into(),
            agent,
            devices: Mutex::new(None),
        }
    }

    /// Build a client with the token from the configured environment variable.
    pub fn from_env(config: HubConfig) -> RegistryResult<Self> {
        let token = config.token().ok_or_else(|| RegistryError::Fetch {
            message: format!("environment variable {} is not set", config.token_env),
        })?;
        Ok(Self::new(config, token))
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> RegistryResult<T> {
        let url = self.url(path);
        let resp = self
            .agent
            .get(&url)
            .set("Authorization", &format!("Bearer {}", self.token))
            .call()
            .map_err(|e| RegistryError::Fetch {
                message: match e {
                    ureq::Error::Status(code, _) => format!("{url} returned status {code}"),
                    ureq::Error::Transport(t) => t.to_string(),
                },
            })?;
        resp.into_json().map_err(|e| RegistryError::Fetch {
            message: format!("invalid response from {url}: {e}"),
        })
    }

    fn cached_devices(&self) -> ActuatorResult<Vec<DeviceRecord>> {
        if let Some(devices) = self
            .devices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
        {
            return Ok(devices);
        }
        self.snapshot().map_err(|e| ActuatorError::RequestFailed {
            message: e.to_string(),
        })
    }
}

impl DeviceRegistry for HubClient {
    fn snapshot(&self) -> RegistryResult<Vec<DeviceRecord>> {
        let services: Vec<ServiceDomain> = self.get_json("api/services")?;
        let states: Vec<EntityState> = self.get_json("api/states")?;
        let devices = build_device_list(&services, &states);
        tracing::info!(
            url = %self.config.base_url,
            entities = states.len(),
            devices = devices.len(),
            "device list fetched from hub"
        );
        *self
            .devices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(devices.clone());
        Ok(devices)
    }
}

impl Actuator for HubClient {
    fn execute(&self, request: &ActionRequest) -> ActuatorResult<ActuationReceipt> {
        let entity_id = match request.target() {
            ActionTarget::EntityId(id) => id.clone(),
            ActionTarget::Name(name) => {
                let devices = self.cached_devices()?;
                let id = resolve_entity_id(name, &devices)
                    .ok_or_else(|| ActuatorError::UnresolvedTarget { name: name.clone() })?;
                tracing::debug!(name = %name, entity_id = id, "target name resolved");
                id.to_string()
            }
        };

        let domain = request.domain().as_str();
        let url = self.url(&format!("api/services/{domain}/{}", request.action()));
        let resp = self
            .agent
            .post(&url)
            .set("Authorization", &format!("Bearer {}", self.token))
            .set("Content-Type", "application/json")
            .send_json(serde_json::json!({ "entity_id": entity_id }))
            .map_err(|e| match e {
                ureq::Error::Status(code, resp) => ActuatorError::Rejected {
                    domain: domain.to_string(),
                    action: request.action().to_string(),
                    message: format!(
                        "status {code}: {}",
                        resp.into_string().unwrap_or_default()
                    ),
                },
                ureq::Error::Transport(t) => ActuatorError::RequestFailed {
                    message: t.to_string(),
                },
            })?;
        let body = resp.into_string().map_err(|e| ActuatorError::RequestFailed {
            message: format!("reading response of {request}: {e}"),
        })?;
        let response = parse_service_response(&body);

        tracing::info!(%request, entity_id = %entity_id, "action executed");
        Ok(ActuationReceipt {
            entity_id: Some(entity_id),
            response,
            simulated: false,
        })
    }
}

/// Parse the body of a service call. The call has already taken effect, so
/// an unreadable body is logged and dropped rather than reported as a failure.
fn parse_service_response(body: &str) -> Option<serde_json::Value> {
    if body.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(body) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(error = %e, bytes = body.len(), "unparseable service response");
            None
        }
    }
}

impl std::fmt::Debug for HubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubClient")
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn services() -> Vec<ServiceDomain> {
        serde_json::from_str(
            r#"[
                {"domain": "light", "services": {"turn_on": {}, "turn_off": {}, "toggle": {}}},
                {"domain": "switch", "services": {"turn_on": {}, "turn_off": {}}},
                {"domain": "climate", "services": {"set_temperature": {}}}
            ]"#,
        )
        .unwrap()
    }

    fn states() -> Vec<EntityState> {
        serde_json::from_str(
            r#"[
                {"entity_id": "light.deckenlampe", "state": "on", "attributes": {
                    "friendly_name": "Deckenlampe",
                    "supported_color_modes": ["color_temp", "hs"],
                    "min_color_temp_kelvin": 2000, "max_color_temp_kelvin": 6500}},
                {"entity_id": "light.flurlicht", "state": "off", "attributes": {
                    "friendly_name": "Flurlicht", "supported_color_modes": ["onoff"]}},
                {"entity_id": "switch.tv_steckdose", "state": "on", "attributes": {}},
                {"entity_id": "climate.heizung", "state": "heat", "attributes": {"friendly_name": "Heizung"}},
                {"entity_id": "sun", "attributes": {}}
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn only_supported_domains_become_devices() {
        let devices = build_device_list(&services(), &states());
        let ids: Vec<_> = devices.iter().filter_map(|d| d.entity_id.as_deref()).collect();
        assert_eq!(ids, vec!["light.deckenlampe", "light.flurlicht", "switch.tv_steckdose"]);
    }

    #[test]
    fn names_and_actions_are_filled_in() {
        let devices = build_device_list(&services(), &states());
        assert_eq!(devices[0].name, "Deckenlampe");
        assert_eq!(devices[2].name, "switch.tv_steckdose");
        assert_eq!(devices[2].domain, DeviceDomain::Switch);
        assert!(devices[0].actions.contains("toggle"));
        assert!(!devices[2].actions.contains("toggle"));
        assert_eq!(devices[2].capabilities, Some(Capabilities::default()));
    }

    #[test]
    fn light_capabilities_follow_color_modes() {
        let devices = build_device_list(&services(), &states());
        let ceiling = devices[0].capabilities.clone().unwrap();
        assert!(ceiling.can_set_brightness);
        assert!(ceiling.can_set_color_temp);
        assert!(ceiling.can_set_color);
        assert_eq!(ceiling.min_temp_kelvin, Some(2000));
        assert_eq!(ceiling.max_temp_kelvin, Some(6500));

        let hallway = devices[1].capabilities.clone().unwrap();
        assert!(hallway.is_empty());
    }

    #[test]
    fn switch_snapshot_carries_an_empty_capability_map() {
        let devices = build_device_list(&services(), &states());
        let json = serde_json::to_value(&devices[2]).unwrap();
        assert_eq!(json["capabilities"], serde_json::json!({}));
    }

    #[test]
    fn service_response_bodies() {
        assert_eq!(parse_service_response(""), None);
        assert_eq!(parse_service_response("  \n"), None);
        assert_eq!(parse_service_response("<html>502</html>"), None);
        assert_eq!(
            parse_service_response(r#"[{"entity_id": "light.deckenlampe", "state": "on"}]"#),
            Some(serde_json::json!([{"entity_id": "light.deckenlampe", "state": "on"}]))
        );
    }

    #[test]
    fn missing_service_domain_yields_no_actions() {
        let devices = build_device_list(&[], &states());
        assert!(devices.iter().all(|d| d.actions.is_empty()));
    }

    #[test]
    fn name_resolution_takes_last_match() {
        let devices = vec![
            DeviceRecord::new("Lampe", DeviceDomain::Light).with_entity_id("light.a"),
            DeviceRecord::new("Lampe", DeviceDomain::Light).with_entity_id("light.b"),
            DeviceRecord::new("Steckdose", DeviceDomain::Switch),
        ];
        assert_eq!(resolve_entity_id("Lampe", &devices), Some("light.b"));
        assert_eq!(resolve_entity_id("Steckdose", &devices), None);
        assert_eq!(resolve_entity_id("lampe", &devices), None);
    }

    #[test]
    fn config_defaults() {
        let config: HubConfig = toml::from_str("").unwrap();
        assert_eq!(config, HubConfig::default());
        assert_eq!(config.base_url, "http://homeassistant.local:8123");
        assert_eq!(config.token_env, "HA_TOKEN");
    }

    #[test]
    fn unresolvable_name_fails_without_request() {
        let client = HubClient::new(
            HubConfig {
                base_url: "http://127.0.0.1:9".into(),
                timeout_secs: 1,
                ..HubConfig::default()
            },
            "token",
        );
        *client.devices.lock().unwrap() =
            Some(vec![DeviceRecord::new("Lampe", DeviceDomain::Light).with_entity_id("light.lampe")]);
        let request = ActionRequest::builder(DeviceDomain::Light, "turn_on").name("Stehlampe");
        assert!(matches!(
            client.execute(&request),
            Err(ActuatorError::UnresolvedTarget { .. })
        ));
    }

    #[test]
    fn unreachable_hub_is_a_fetch_error() {
        let client = HubClient::new(
            HubConfig {
                base_url: "http://127.0.0.1:9".into(),
                timeout_secs: 1,
                ..HubConfig::default()
            },
            "token",
        );
        assert!(matches!(client.snapshot(), Err(RegistryError::Fetch { .. })));
    }
}
