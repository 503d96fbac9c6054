//! Mapping config: where each logical field lives on the portal.

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{AutomationError, Result};

/// How to find one logical field. Blank strings count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(
        default,
        alias = "labelRegex",
        skip_serializing_if = "Option::is_none"
    )]
    pub label_pattern: Option<String>,
}

impl FieldDescriptor {
    pub fn with_selector(selector: &str) -> Self {
        Self {
            selector: Some(selector.to_string()),
            label_pattern: None,
        }
    }

    pub fn with_label_pattern(pattern: &str) -> Self {
        Self {
            selector: None,
            label_pattern: Some(pattern.to_string()),
        }
    }

    pub fn selector(&self) -> Option<&str> {
        non_blank(self.selector.as_deref())
    }

    pub fn label_pattern(&self) -> Option<&str> {
        non_blank(self.label_pattern.as_deref())
    }

    pub fn is_unresolvable(&self) -> bool {
        self.selector().is_none() && self.label_pattern().is_none()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Field key to descriptor, in the order the config file lists them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap(Vec<(String, FieldDescriptor)>);

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; a replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, descriptor: FieldDescriptor) {
        let key = key.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = descriptor,
            None => self.0.push((key, descriptor)),
        }
    }

    pub fn with(mut self, key: &str, descriptor: FieldDescriptor) -> Self {
        self.insert(key, descriptor);
        self
    }

    pub fn get(&self, key: &str) -> Option<&FieldDescriptor> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, d)| d)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldDescriptor)> {
        self.0.iter().map(|(k, d)| (k.as_str(), d))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, descriptor) in &self.0 {
            map.serialize_entry(key, descriptor)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FieldMap {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct FieldMapVisitor;

        impl<'de> Visitor<'de> for FieldMapVisitor {
            type Value = FieldMap;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("an object mapping field keys to field descriptors")
            }

            fn visit_map<A>(self, mut access: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut fields = FieldMap::new();
                while let Some((key, descriptor)) =
                    access.next_entry::<String, FieldDescriptor>()?
                {
                    if fields.contains_key(&key) {
                        return Err(de::Error::custom(format!("duplicate field key `{key}`")));
                    }
                    fields.insert(key, descriptor);
                }
                Ok(fields)
            }
        }

        deserializer.deserialize_map(FieldMapVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeSettings {
    /// Case-insensitive pattern matched against trigger text.
    #[serde(default = "default_view_label")]
    pub view_label: String,
    /// Element whose rendered text becomes the episode body.
    #[serde(default = "default_text_selector")]
    pub text_selector: String,
}

impl Default for EpisodeSettings {
    fn default() -> Self {
        Self {
            view_label: default_view_label(),
            text_selector: default_text_selector(),
        }
    }
}

fn default_view_label() -> String {
    "view".to_string()
}

fn default_text_selector() -> String {
    "body".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingConfig {
    pub portal_url: String,
    #[serde(default)]
    pub patient_search: FieldDescriptor,
    #[serde(default)]
    pub fields: FieldMap,
    #[serde(default)]
    pub episodes: EpisodeSettings,
    /// File this config was read from; empty for in-memory configs.
    #[serde(skip)]
    pub source: PathBuf,
}

impl MappingConfig {
    pub fn new(portal_url: &str, patient_search: FieldDescriptor, fields: FieldMap) -> Self {
        Self {
            portal_url: portal_url.to_string(),
            patient_search,
            fields,
            episodes: EpisodeSettings::default(),
            source: PathBuf::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AutomationError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let mut config = Self::from_json_str(&raw).map_err(|e| match e {
            AutomationError::Config(message) => {
                AutomationError::Config(format!("{}: {message}", path.display()))
            }
            other => other,
        })?;
        config.source = path.to_path_buf();
        Ok(config)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        if config.portal_url.trim().is_empty() {
            return Err(AutomationError::Config("portalUrl is empty".to_string()));
        }
        Ok(config)
    }

    /// Name shown to users when pointing them at the file to edit.
    pub fn source_name(&self) -> String {
        if self.source.as_os_str().is_empty() {
            "the mapping config".to_string()
        } else {
            self.source.display().to_string()
        }
    }
}
