//! Uniform result envelope returned for every command

use serde::{Deserialize, Serialize};

/// Number of free-form string slots in a result
pub const CUSTOM_INFO_SLOTS: usize = 3;

/// Most commands only set `success` and `exit_code`; version and statistics
/// queries carry their data in the string fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommandResult {
    pub success: bool,
    pub exit_code: i32,
    pub additional_string: String,
    pub custom_info_values: [String; CUSTOM_INFO_SLOTS],
}

impl CommandResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failure() -> Self {
        Self::default()
    }

    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = exit_code;
        self
    }

    pub fn with_additional_string(mut self, value: impl Into<String>) -> Self {
        self.additional_string = value.into();
        self
    }
}
