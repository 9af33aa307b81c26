//! # Session Metadata
//!
//! Parses the session info YAML embedded in a recording and reduces it to the
//! [`SessionContext`] the lap pipeline needs: which driver, on which track, in
//! which car, during what kind of session, in what conditions.
//!
//! ## Leniency
//!
//! The simulator's YAML is loosely typed. A track configuration named `2008`
//! arrives as a number, a missing driver list arrives as nothing at all. Every
//! field here is optional and every text field accepts any scalar, so a field
//! the extractor does not recognise never fails the parse. Only a missing
//! block ([`GarageError::MetadataMissing`](crate::GarageError::MetadataMissing))
//! or YAML that cannot be read at all is an error.
//!
//! The YAML must already be preprocessed (see
//! [`preprocess_iracing_yaml`](crate::yaml_utils::preprocess_iracing_yaml));
//! [`TelemetrySource::session_yaml`](crate::TelemetrySource::session_yaml)
//! returns it that way.

use serde::{Deserialize, Deserializer, Serialize};

pub mod context;
pub mod driver;
pub mod session_data;
pub mod timing;
pub mod weekend;

pub use context::{SessionContext, SessionType, TrackId, extract_context};
pub use driver::{Driver, DriverInfoData};
pub use session_data::{Session, SessionInfoData};
pub use timing::{Sector, SplitTimeInfo};
pub use weekend::WeekendInfo;

/// Session information parsed from the recording's YAML block.
#[derive(Default, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
#[serde(default)]
pub struct SessionInfo {
    /// Weekend and track information
    pub weekend_info: Option<WeekendInfo>,
    /// Session information and session list
    pub session_info: Option<SessionInfoData>,
    /// Driver information (player car index + drivers list)
    pub driver_info: Option<DriverInfoData>,
    /// Split timing information
    pub split_time_info: Option<SplitTimeInfo>,
}

impl SessionInfo {
    /// Parse cleaned YAML into SessionInfo
    pub fn parse(yaml: &str) -> crate::Result<Self> {
        serde_yaml_ng::from_str(yaml).map_err(|e| crate::GarageError::Parse {
            context: "SessionInfo deserialization".to_string(),
            details: e.to_string(),
        })
    }
}

/// Accept any YAML scalar as text.
///
/// Used on every free-form text field; sequences and mappings become `None`.
pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_yaml_ng::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(scalar_text))
}

fn scalar_text(value: &serde_yaml_ng::Value) -> Option<String> {
    use serde_yaml_ng::Value;
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Tagged(tagged) => scalar_text(&tagged.value),
        Value::Null | Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

/// Accept an integer, a float with no fractional part, or numeric text.
pub(crate) fn lenient_i32<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde_yaml_ng::Value;
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .and_then(|v| i32::try_from(v).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Accept a number or numeric text.
pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde_yaml_ng::Value;
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}
