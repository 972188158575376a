//! Payload schema registry.
//!
//! The envelope keeps its reserved fields structural and the type-specific
//! payload opaque. Payload shape is resolved through a registry keyed by
//! `(event type, version)`: producers register the types they emit, and
//! the append path rejects payloads that fail to decode against a
//! registered schema. Unregistered types pass through untouched.

use std::collections::HashMap;

use serde::de::DeserializeOwned;

use crate::error::StoreError;

type Validator = Box<dyn Fn(&serde_json::Value) -> Result<(), String> + Send + Sync>;

/// Registry of payload schemas keyed by `(event type, version)`.
#[derive(Default)]
pub struct PayloadRegistry {
    schemas: HashMap<(String, i32), Validator>,
}

impl PayloadRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` as the payload schema for `(event_type, version)`.
    /// A later registration for the same key replaces the earlier one.
    pub fn register<T: DeserializeOwned>(&mut self, event_type: impl Into<String>, version: i32) {
        self.schemas.insert(
            (event_type.into(), version),
            Box::new(|payload| {
                serde_json::from_value::<T>(payload.clone())
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            }),
        );
    }

    /// Returns whether a schema is registered for `(event_type, version)`.
    #[must_use]
    pub fn contains(&self, event_type: &str, version: i32) -> bool {
        self.schemas.contains_key(&(event_type.to_owned(), version))
    }

    /// Validates a payload against the registered schema, if any.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Validation` when a schema is registered for
    /// `(event_type, version)` and the payload fails to decode against it.
    /// Unregistered types always validate.
    pub fn validate(
        &self,
        event_type: &str,
        version: i32,
        payload: &serde_json::Value,
    ) -> Result<(), StoreError> {
        match self.schemas.get(&(event_type.to_owned(), version)) {
            Some(validator) => validator(payload).map_err(|e| {
                StoreError::Validation(format!(
                    "payload does not match schema for {event_type} v{version}: {e}"
                ))
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct SpacecraftCreated {
        #[allow(dead_code)]
        name: String,
        #[allow(dead_code)]
        mission_id: uuid::Uuid,
    }

    #[test]
    fn test_registered_schema_accepts_matching_payload() {
        let mut registry = PayloadRegistry::new();
        registry.register::<SpacecraftCreated>("SpacecraftCreated", 1);

        let payload = serde_json::json!({
            "name": "Sentinel-7",
            "mission_id": uuid::Uuid::new_v4(),
        });
        assert!(registry.validate("SpacecraftCreated", 1, &payload).is_ok());
    }

    #[test]
    fn test_registered_schema_rejects_mismatched_payload() {
        let mut registry = PayloadRegistry::new();
        registry.register::<SpacecraftCreated>("SpacecraftCreated", 1);

        let payload = serde_json::json!({"name": 42});
        match registry
            .validate("SpacecraftCreated", 1, &payload)
            .unwrap_err()
        {
            StoreError::Validation(msg) => assert!(msg.contains("SpacecraftCreated v1")),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_unregistered_type_and_version_pass_through() {
        let mut registry = PayloadRegistry::new();
        registry.register::<SpacecraftCreated>("SpacecraftCreated", 1);

        let payload = serde_json::json!({"anything": true});
        assert!(registry.validate("MissionClosed", 1, &payload).is_ok());
        // Same type, unregistered version.
        assert!(registry.validate("SpacecraftCreated", 2, &payload).is_ok());
    }
}
