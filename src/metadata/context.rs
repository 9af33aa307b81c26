//! Session context extraction.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use super::SessionInfo;
use crate::{GarageError, Result, TelemetrySource};

/// Kind of session a recording was made in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    Practice,
    Qualifying,
    Race,
    TimeTrial,
}

impl SessionType {
    /// Classify one sub-session type string.
    pub fn from_session_name(name: &str) -> Option<Self> {
        let name = name.to_lowercase();
        if name.contains("race") {
            Some(SessionType::Race)
        } else if name.contains("qual") {
            Some(SessionType::Qualifying)
        } else if name.contains("practice") {
            Some(SessionType::Practice)
        } else if name.contains("time") && name.contains("trial") {
            Some(SessionType::TimeTrial)
        } else {
            None
        }
    }

    /// First sub-session that classifies wins.
    pub fn classify<'a>(names: impl IntoIterator<Item = &'a str>) -> Option<Self> {
        names.into_iter().find_map(Self::from_session_name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Practice => "practice",
            SessionType::Qualifying => "qualifying",
            SessionType::Race => "race",
            SessionType::TimeTrial => "time_trial",
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Track identity: display name plus layout. An unnamed layout is `""`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId {
    pub name: String,
    pub config: String,
}

impl TrackId {
    pub fn new(name: impl Into<String>, config: impl Into<String>) -> Self {
        Self { name: name.into(), config: config.into() }
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.config.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{} - {}", self.name, self.config)
        }
    }
}

/// Who, where, in what, and under which conditions a recording was made.
///
/// Every field is optional: absent or blank YAML values become `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub track_name: Option<String>,
    pub track_config: Option<String>,
    pub track_length_km: Option<f64>,
    pub car_name: Option<String>,
    pub car_class: Option<String>,
    pub driver_name: Option<String>,
    pub setup_name: Option<String>,
    pub session_type: Option<SessionType>,
    pub air_temp_c: Option<f64>,
    pub track_temp_c: Option<f64>,
    pub weather: Option<String>,
    pub skies: Option<String>,
    /// Sector start fractions of the lap, ascending.
    pub sector_starts: Vec<f64>,
}

impl SessionContext {
    /// Parse preprocessed session YAML and extract the context.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(Self::from_session_info(&SessionInfo::parse(yaml)?))
    }

    pub fn from_session_info(info: &SessionInfo) -> Self {
        let mut context = SessionContext::default();

        if let Some(weekend) = &info.weekend_info {
            context.track_name = non_blank(&weekend.track_display_name);
            context.track_config = non_blank(&weekend.track_config_name);
            context.track_length_km = weekend.track_length_km();
            context.air_temp_c = weekend.air_temp_c();
            context.track_temp_c = weekend.track_temp_c();
            context.weather = non_blank(&weekend.track_weather_type);
            context.skies = non_blank(&weekend.track_skies);
        }

        if let Some(driver_info) = &info.driver_info {
            context.setup_name = non_blank(&driver_info.driver_setup_name);
            if let Some(player) = driver_info.player() {
                context.driver_name = non_blank(&player.user_name);
                context.car_name = non_blank(&player.car_screen_name);
                context.car_class = non_blank(&player.car_class_short_name);
            }
        }

        if let Some(sessions) = &info.session_info {
            context.session_type = SessionType::classify(
                sessions.sessions.iter().filter_map(|s| s.session_type.as_deref()),
            );
        }

        if let Some(split) = &info.split_time_info {
            context.sector_starts = split.sector_starts();
        }

        debug!(
            track = ?context.track_name,
            car = ?context.car_name,
            session_type = ?context.session_type,
            "Extracted session context"
        );
        context
    }

    /// Track identity, when the recording names a track.
    pub fn track_id(&self) -> Option<TrackId> {
        let name = self.track_name.as_ref()?;
        Some(TrackId::new(name.clone(), self.track_config.clone().unwrap_or_default()))
    }
}

/// Read and extract the session context of a source.
///
/// A source without a session info block fails with
/// [`GarageError::MetadataMissing`].
pub fn extract_context<S: TelemetrySource + ?Sized>(source: &S) -> Result<SessionContext> {
    let yaml = source
        .session_yaml()?
        .ok_or_else(|| GarageError::metadata_missing(source.source_path()))?;
    let context = SessionContext::from_yaml(&yaml)?;
    info!(
        path = %source.source_path().display(),
        track = context.track_name.as_deref().unwrap_or(""),
        car = context.car_name.as_deref().unwrap_or(""),
        "Session metadata extracted"
    );
    Ok(context)
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}
