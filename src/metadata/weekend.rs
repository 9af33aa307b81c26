//! Weekend and track information
//!
//! Track identity, track length and the environmental conditions recorded
//! with the session.

use serde::{Deserialize, Serialize};

use super::{lenient_i32, lenient_string};

/// Weekend and track information from iRacing
#[derive(Default, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
#[serde(default)]
pub struct WeekendInfo {
    /// Track directory name
    #[serde(deserialize_with = "lenient_string")]
    pub track_name: Option<String>,
    /// Track ID
    #[serde(rename = "TrackID", deserialize_with = "lenient_i32")]
    pub track_id: Option<i32>,
    /// Track length, e.g. `"2.44 km"`
    #[serde(deserialize_with = "lenient_string")]
    pub track_length: Option<String>,
    /// Track display name
    #[serde(deserialize_with = "lenient_string")]
    pub track_display_name: Option<String>,
    /// Track configuration name
    #[serde(deserialize_with = "lenient_string")]
    pub track_config_name: Option<String>,
    /// Track city
    #[serde(deserialize_with = "lenient_string")]
    pub track_city: Option<String>,
    /// Track country
    #[serde(deserialize_with = "lenient_string")]
    pub track_country: Option<String>,
    /// Track type (road course, oval, etc.)
    #[serde(deserialize_with = "lenient_string")]
    pub track_type: Option<String>,
    /// Track weather type (Static, Dynamic)
    #[serde(deserialize_with = "lenient_string")]
    pub track_weather_type: Option<String>,
    /// Track skies condition
    #[serde(deserialize_with = "lenient_string")]
    pub track_skies: Option<String>,
    /// Track surface temperature, e.g. `"33.15 C"`
    #[serde(deserialize_with = "lenient_string")]
    pub track_surface_temp: Option<String>,
    /// Track air temperature, e.g. `"24.32 C"`
    #[serde(deserialize_with = "lenient_string")]
    pub track_air_temp: Option<String>,
    /// Event type
    #[serde(deserialize_with = "lenient_string")]
    pub event_type: Option<String>,
    /// Category (Road, Oval, etc.)
    #[serde(deserialize_with = "lenient_string")]
    pub category: Option<String>,
    /// Sub-session ID
    #[serde(rename = "SubSessionID", deserialize_with = "lenient_i32")]
    pub sub_session_id: Option<i32>,
}

impl WeekendInfo {
    /// Track length in kilometres, parsed from the `" km"` suffixed text.
    pub fn track_length_km(&self) -> Option<f64> {
        parse_with_unit(self.track_length.as_deref()?, "km")
    }

    /// Air temperature in °C.
    pub fn air_temp_c(&self) -> Option<f64> {
        parse_with_unit(self.track_air_temp.as_deref()?, "C")
    }

    /// Track surface temperature in °C.
    pub fn track_temp_c(&self) -> Option<f64> {
        parse_with_unit(self.track_surface_temp.as_deref()?, "C")
    }
}

fn parse_with_unit(text: &str, unit: &str) -> Option<f64> {
    let text = text.trim();
    let number = text.strip_suffix(unit).unwrap_or(text).trim();
    number.parse().ok().filter(|v: &f64| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn units_are_stripped() {
        let weekend = WeekendInfo {
            track_length: Some("5.79 km".into()),
            track_air_temp: Some("18.90 C".into()),
            track_surface_temp: Some("27 C".into()),
            ..Default::default()
        };
        assert_eq!(weekend.track_length_km(), Some(5.79));
        assert_eq!(weekend.air_temp_c(), Some(18.9));
        assert_eq!(weekend.track_temp_c(), Some(27.0));
    }

    #[test]
    fn unparseable_values_are_none() {
        let weekend = WeekendInfo {
            track_length: Some("long".into()),
            track_air_temp: Some(" C".into()),
            ..Default::default()
        };
        assert_eq!(weekend.track_length_km(), None);
        assert_eq!(weekend.air_temp_c(), None);
        assert_eq!(weekend.track_temp_c(), None);
    }
}
