//! Typed object/property bags attached to a document revision.

use serde::{Deserialize, Serialize};

/// A single named property of an object instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectProperty {
    pub name: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// A typed property bag attached to a revision.
///
/// Unknown class names are preserved opaquely rather than rejected, to keep
/// forward compatibility with classes this engine does not know about.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInstance {
    pub class_name: String,
    #[serde(default)]
    pub properties: Vec<ObjectProperty>,
}

impl ObjectInstance {
    /// Look up a property by name.
    pub fn property(&self, name: &str) -> Option<&ObjectProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Validate the instance shape: a class name and non-empty property names.
    pub fn validate(&self) -> Result<(), String> {
        if self.class_name.trim().is_empty() {
            return Err("object className is required".to_string());
        }
        if let Some(p) = self.properties.iter().find(|p| p.name.trim().is_empty()) {
            return Err(format!(
                "object {} has a property with an empty name: {:?}",
                self.class_name, p.value
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_property_lookup() {
        let object = ObjectInstance {
            class_name: "XWiki.TagClass".to_string(),
            properties: vec![ObjectProperty {
                name: "tags".to_string(),
                value: json!("TAG"),
            }],
        };
        assert_eq!(object.property("tags").unwrap().value, json!("TAG"));
        assert!(object.property("missing").is_none());
    }

    #[test]
    fn test_validate_rejects_empty_class_name() {
        let object = ObjectInstance {
            class_name: "  ".to_string(),
            properties: vec![],
        };
        assert!(object.validate().is_err());
    }

    #[test]
    fn test_unknown_class_preserved() {
        let object: ObjectInstance = serde_json::from_value(json!({
            "className": "Some.FutureClass",
            "properties": [{"name": "x", "value": 1}]
        }))
        .unwrap();
        assert_eq!(object.class_name, "Some.FutureClass");
        assert!(object.validate().is_ok());
    }
}
