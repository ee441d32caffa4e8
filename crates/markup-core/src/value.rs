use serde::{Deserialize, Serialize};

use crate::tree::Fragment;

const DEFAULT_SCHEMA: &str = "plate-markup";
const DEFAULT_VERSION: u32 = 1;

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}

fn default_version() -> u32 {
    DEFAULT_VERSION
}

/// JSON envelope for content delivered to or exported from an editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkupValue {
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub fragment: Fragment,
}

impl MarkupValue {
    pub fn from_fragment(fragment: Fragment) -> Self {
        Self {
            schema: default_schema(),
            version: default_version(),
            fragment,
        }
    }

    pub fn into_fragment(self) -> Fragment {
        self.fragment
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
