//! Singleton site configuration holding all editable public-facing text.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The one record holding the institute's public content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct SiteConfig {
    pub director_message: String,
    pub phone: String,
    pub address: String,
    pub admission_status: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            director_message: "Our aim at 'The Impulse Academy' is to provide quality education to smaller cities like Giridih...".to_string(),
            phone: "+91 97988 06907".to_string(),
            address: "Sihodih Rd, Pandardih, Giridih, Jharkhand 815302".to_string(),
            admission_status: "Admission Open 2025-26".to_string(),
        }
    }
}

impl SiteConfig {
    /// Serialize into the field map stored in the document.
    pub fn to_fields(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// Request body for the admin content editor.
///
/// Only fields present in the request are written; the rest keep their stored values.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfigUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admission_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub director_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl SiteConfigUpdate {
    pub fn is_empty(&self) -> bool {
        self.admission_status.is_none() && self.director_message.is_none() && self.phone.is_none()
    }

    /// The partial field map sent to the store.
    pub fn to_fields(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}
