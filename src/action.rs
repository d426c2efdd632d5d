//! Device action requests and the actuators that carry them out.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::device::{DeviceDomain, DeviceRecord};
use crate::error::ActuatorResult;

/// How an action addresses its device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTarget {
    EntityId(String),
    /// Display name, for devices the registry knows no entity id for.
    Name(String),
}

impl std::fmt::Display for ActionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EntityId(id) => f.write_str(id),
            Self::Name(name) => write!(f, "\"{name}\""),
        }
    }
}

/// A finished, immutable request to perform `action` on a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    domain: DeviceDomain,
    action: String,
    target: ActionTarget,
}

impl ActionRequest {
    /// Address `device` by entity id when it has one, by name otherwise.
    pub fn for_device(device: &DeviceRecord, action: impl Into<String>) -> Self {
        let target = match &device.entity_id {
            Some(id) => ActionTarget::EntityId(id.clone()),
            None => ActionTarget::Name(device.name.clone()),
        };
        Self {
            domain: device.domain,
            action: action.into(),
            target,
        }
    }

    pub fn builder(domain: DeviceDomain, action: impl Into<String>) -> ActionRequestBuilder {
        ActionRequestBuilder {
            domain,
            action: action.into(),
        }
    }

    pub fn domain(&self) -> DeviceDomain {
        self.domain
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn target(&self) -> &ActionTarget {
        &self.target
    }
}

impl std::fmt::Display for ActionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{} → {}", self.domain, self.action, self.target)
    }
}

/// Builder for requests not derived from a registry record.
#[derive(Debug, Clone)]
pub struct ActionRequestBuilder {
    domain: DeviceDomain,
    action: String,
}

impl ActionRequestBuilder {
    pub fn entity_id(self, id: impl Into<String>) -> ActionRequest {
        self.target(ActionTarget::EntityId(id.into()))
    }

    pub fn name(self, name: impl Into<String>) -> ActionRequest {
        self.target(ActionTarget::Name(name.into()))
    }

    pub fn target(self, target: ActionTarget) -> ActionRequest {
        ActionRequest {
            domain: self.domain,
            action: self.action,
            target,
        }
    }
}

/// What an actuator reports back after executing a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuationReceipt {
    /// Entity the action was applied to, when known.
    pub entity_id: Option<String>,
    /// Raw response body from the backend, if it sent one.
    pub response: Option<serde_json::Value>,
    /// Whether the request was only simulated.
    pub simulated: bool,
}

/// Executes action requests against real or simulated devices.
pub trait Actuator: Send + Sync {
    fn execute(&self, request: &ActionRequest) -> ActuatorResult<ActuationReceipt>;
}

/// Logs requests without executing them.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunActuator;

impl Actuator for DryRunActuator {
    fn execute(&self, request: &ActionRequest) -> ActuatorResult<ActuationReceipt> {
        tracing::info!(%request, "dry run, action not sent");
        let entity_id = match request.target() {
            ActionTarget::EntityId(id) => Some(id.clone()),
            ActionTarget::Name(_) => None,
        };
        Ok(ActuationReceipt {
            entity_id,
            response: None,
            simulated: true,
        })
    }
}

/// Keeps every request it receives; for tests and diagnostics.
#[derive(Debug, Default)]
pub struct RecordingActuator {
    requests: Mutex<Vec<ActionRequest>>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<ActionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Actuator for RecordingActuator {
    fn execute(&self, request: &ActionRequest) -> ActuatorResult<ActuationReceipt> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());
        DryRunActuator.execute(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_prefers_entity_id() {
        let lamp = DeviceRecord::new("Standlampe", DeviceDomain::Light).with_entity_id("light.standlampe");
        let request = ActionRequest::for_device(&lamp, "turn_off");
        assert_eq!(request.target(), &ActionTarget::EntityId("light.standlampe".into()));
        assert_eq!(request.domain(), DeviceDomain::Light);
        assert_eq!(request.to_string(), "light.turn_off → light.standlampe");
    }

    #[test]
    fn request_falls_back_to_name() {
        let plug = DeviceRecord::new("TV Steckdose", DeviceDomain::Switch);
        let request = ActionRequest::for_device(&plug, "turn_on");
        assert_eq!(request.target(), &ActionTarget::Name("TV Steckdose".into()));
    }

    #[test]
    fn request_owns_its_strings() {
        let request = {
            let lamp = DeviceRecord::new("Standlampe", DeviceDomain::Light);
            ActionRequest::for_device(&lamp, String::from("toggle"))
        };
        assert_eq!(request.action(), "toggle");
    }

    #[test]
    fn builder_sets_target() {
        let request = ActionRequest::builder(DeviceDomain::Switch, "turn_on").entity_id("switch.tv");
        assert_eq!(request.target(), &ActionTarget::EntityId("switch.tv".into()));
    }

    #[test]
    fn recording_actuator_keeps_order() {
        let actuator = RecordingActuator::new();
        let first = ActionRequest::builder(DeviceDomain::Light, "turn_on").name("A");
        let second = ActionRequest::builder(DeviceDomain::Light, "turn_off").name("B");
        actuator.execute(&first).unwrap();
        let receipt = actuator.execute(&second).unwrap();
        assert!(receipt.simulated);
        assert_eq!(actuator.requests(), vec![first, second]);
    }
}
