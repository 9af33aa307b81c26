//! Session list structures

use serde::{Deserialize, Serialize};

use super::{lenient_i32, lenient_string};

/// Session information data from iRacing
#[derive(Default, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
#[serde(default)]
pub struct SessionInfoData {
    /// Current session number
    #[serde(deserialize_with = "lenient_i32")]
    pub current_session_num: Option<i32>,
    /// List of sessions
    pub sessions: Vec<Session>,
}

/// Individual session data
#[derive(Default, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
#[serde(default)]
pub struct Session {
    /// Session number
    #[serde(deserialize_with = "lenient_i32")]
    pub session_num: Option<i32>,
    /// Session laps ("unlimited" or number)
    #[serde(deserialize_with = "lenient_string")]
    pub session_laps: Option<String>,
    /// Session time ("unlimited" or time)
    #[serde(deserialize_with = "lenient_string")]
    pub session_time: Option<String>,
    /// Session type
    #[serde(deserialize_with = "lenient_string")]
    pub session_type: Option<String>,
    /// Session name
    #[serde(deserialize_with = "lenient_string")]
    pub session_name: Option<String>,
}
