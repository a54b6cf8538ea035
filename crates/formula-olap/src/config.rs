use crate::error::{OlapError, OlapResult};
use crate::sql::Dialect;
use serde::{Deserialize, Serialize};

/// Switches and thresholds controlling native (SQL) set evaluation.
///
/// Every field has a default, so a partial JSON document such as
/// `{"enableNativeExcept": false}` is a valid settings file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NativeSettings {
    pub enable_native_non_empty: bool,
    pub enable_native_except: bool,
    /// Reject native NonEmpty when the first cross-join argument is an All level.
    pub non_empty_excludes_all_level: bool,
    /// Enumerated member lists shorter than this are left to the interpreter.
    pub min_enumerated_members: usize,
    /// Poll for cancellation every this many iterations; 0 disables polling.
    pub cancel_check_interval: usize,
    pub dialect: Dialect,
}

impl Default for NativeSettings {
    fn default() -> Self {
        Self {
            enable_native_non_empty: true,
            enable_native_except: true,
            non_empty_excludes_all_level: true,
            min_enumerated_members: 2,
            cancel_check_interval: 1000,
            dialect: Dialect::Generic,
        }
    }
}

impl NativeSettings {
    /// Settings with every native path switched off.
    pub fn interpreted() -> Self {
        Self {
            enable_native_non_empty: false,
            enable_native_except: false,
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> OlapResult<Self> {
        serde_json::from_str(json).map_err(|err| OlapError::Settings(err.to_string()))
    }

    pub fn to_json(&self) -> OlapResult<String> {
        serde_json::to_string_pretty(self).map_err(|err| OlapError::Settings(err.to_string()))
    }
}
