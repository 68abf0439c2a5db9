//! NGSI entity types shared across the workspace

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A typed attribute value as stored in the context broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// Declared NGSI type (`Text`, `Number`, `geo:json`, ...)
    #[serde(rename = "type", default)]
    pub attr_type: String,

    #[serde(default)]
    pub value: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl Attribute {
    pub fn new(attr_type: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            attr_type: attr_type.into(),
            value: value.into(),
            metadata: None,
        }
    }
}

/// An NGSI-v2 entity in normalized representation.
///
/// Attributes are kept in a sorted map, so serialization order is stable
/// regardless of the order in which attributes were parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,

    #[serde(rename = "type")]
    pub entity_type: String,

    #[serde(flatten)]
    pub attributes: BTreeMap<String, Attribute>,
}

impl Entity {
    pub fn new(id: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style helper to attach an attribute.
    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        attr_type: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.attributes
            .insert(name.into(), Attribute::new(attr_type, value));
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_from_json() {
        let entity: Entity = serde_json::from_value(json!({
            "id": "id_1",
            "type": "type_A",
            "municipality": {"type": "Text", "value": "NA"},
            "location": {"type": "geo:json", "value": {"type": "Point", "coordinates": [1, 2]}}
        }))
        .unwrap();

        assert_eq!(entity.id, "id_1");
        assert_eq!(entity.entity_type, "type_A");
        assert_eq!(entity.attributes.len(), 2);
        assert_eq!(entity.attribute("municipality").unwrap().value, json!("NA"));
        assert_eq!(entity.attribute("location").unwrap().attr_type, "geo:json");
    }

    #[test]
    fn test_attribute_without_value_is_null() {
        let entity: Entity = serde_json::from_value(json!({
            "id": "id_1",
            "type": "type_A",
            "empty": {"type": "Text"}
        }))
        .unwrap();

        assert_eq!(entity.attribute("empty").unwrap().value, Value::Null);
    }

    #[test]
    fn test_entity_serialization_keeps_id_and_type() {
        let entity = Entity::new("id_2", "type_B").with_attribute("temperature", "Number", 20);
        let value = serde_json::to_value(&entity).unwrap();

        assert_eq!(
            value,
            json!({
                "id": "id_2",
                "type": "type_B",
                "temperature": {"type": "Number", "value": 20}
            })
        );
    }

    #[test]
    fn test_entity_missing_type_fails() {
        let result: Result<Entity, _> = serde_json::from_value(json!({"id": "id_1"}));
        assert!(result.is_err());
    }
}
