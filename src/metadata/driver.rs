//! Driver information structures

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{lenient_i32, lenient_string};

/// Driver information data containing the player's car index + drivers list
#[derive(Default, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
#[serde(default)]
pub struct DriverInfoData {
    /// Player car index
    #[serde(deserialize_with = "lenient_i32")]
    pub driver_car_idx: Option<i32>,
    /// Player user ID
    #[serde(rename = "DriverUserID", deserialize_with = "lenient_i32")]
    pub driver_user_id: Option<i32>,
    /// Pace car index
    #[serde(deserialize_with = "lenient_i32")]
    pub pace_car_idx: Option<i32>,
    /// Loaded setup file
    #[serde(deserialize_with = "lenient_string")]
    pub driver_setup_name: Option<String>,
    /// List of all drivers in session
    pub drivers: Option<Vec<Driver>>,
}

impl DriverInfoData {
    /// The recording driver's entry.
    ///
    /// Matches `CarIdx` against `DriverCarIdx`. When no entry matches, the
    /// first driver is used. Without a `DriverCarIdx` there is no player.
    pub fn player(&self) -> Option<&Driver> {
        let player_idx = self.driver_car_idx?;
        let drivers = self.drivers.as_deref().filter(|d| !d.is_empty())?;
        match drivers.iter().find(|d| d.car_idx == Some(player_idx)) {
            Some(driver) => Some(driver),
            None => {
                warn!(
                    car_idx = player_idx,
                    "Could not find player driver, using first driver as fallback"
                );
                drivers.first()
            }
        }
    }
}

/// Individual driver data (from Drivers list)
#[derive(Default, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
#[serde(default)]
pub struct Driver {
    /// Car index number
    #[serde(deserialize_with = "lenient_i32")]
    pub car_idx: Option<i32>,
    /// Driver name
    #[serde(deserialize_with = "lenient_string")]
    pub user_name: Option<String>,
    /// Driver abbreviation
    #[serde(deserialize_with = "lenient_string")]
    pub abbrev_name: Option<String>,
    /// User ID
    #[serde(rename = "UserID", deserialize_with = "lenient_i32")]
    pub user_id: Option<i32>,
    /// Team name
    #[serde(deserialize_with = "lenient_string")]
    pub team_name: Option<String>,
    /// Car number (display)
    #[serde(deserialize_with = "lenient_string")]
    pub car_number: Option<String>,
    /// Car ID
    #[serde(rename = "CarID", deserialize_with = "lenient_i32")]
    pub car_id: Option<i32>,
    /// Car screen name
    #[serde(deserialize_with = "lenient_string")]
    pub car_screen_name: Option<String>,
    /// Car class short name
    #[serde(deserialize_with = "lenient_string")]
    pub car_class_short_name: Option<String>,
    /// Whether this is a pace car
    #[serde(deserialize_with = "lenient_i32")]
    pub car_is_pace_car: Option<i32>,
    /// Car design string (livery colors)
    #[serde(deserialize_with = "lenient_string")]
    pub car_design_str: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver(idx: i32, name: &str) -> Driver {
        Driver { car_idx: Some(idx), user_name: Some(name.to_string()), ..Default::default() }
    }

    #[test]
    fn player_matches_car_index() {
        let info = DriverInfoData {
            driver_car_idx: Some(4),
            drivers: Some(vec![driver(0, "Pace Car"), driver(4, "Ana Souza")]),
            ..Default::default()
        };
        assert_eq!(info.player().and_then(|d| d.user_name.as_deref()), Some("Ana Souza"));
    }

    #[test]
    fn unmatched_index_falls_back_to_first_driver() {
        let info = DriverInfoData {
            driver_car_idx: Some(9),
            drivers: Some(vec![driver(2, "Kenji Mori"), driver(3, "Lea Brun")]),
            ..Default::default()
        };
        assert_eq!(info.player().and_then(|d| d.user_name.as_deref()), Some("Kenji Mori"));
    }

    #[test]
    fn no_player_without_index_or_drivers() {
        let no_index = DriverInfoData { drivers: Some(vec![driver(0, "A")]), ..Default::default() };
        assert!(no_index.player().is_none());

        let no_drivers = DriverInfoData { driver_car_idx: Some(0), drivers: Some(vec![]), ..Default::default() };
        assert!(no_drivers.player().is_none());
    }
}
