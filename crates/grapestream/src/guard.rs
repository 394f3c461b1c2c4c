//! Station configuration drift detection
//!
//! Every file of a day carries its own header. A day is only
//! meaningful if the station did not move or change its radio
//! setup between files. The [`ConfigurationGuard`] compares each
//! new [`ConfigurationRecord`] against the day's accepted one.

use thiserror::Error;

use crate::header::{ConfigurationRecord, Position};

/// Mean radius of the earth, in meters
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Default maximum station displacement within a day, in meters
pub const MAX_DISPLACEMENT_M: f64 = 5.0;

/// Great-circle distance between two positions, in meters
///
/// Haversine formula on a spherical earth. Elevation is ignored.
///
/// ```
/// use grapestream::{distance_meters, Position};
///
/// let a = Position { latitude: 0.0, longitude: 0.0, elevation: 0.0 };
/// let b = Position { latitude: 0.0, longitude: 1.0, elevation: 0.0 };
/// let d = distance_meters(&a, &b);
/// assert!((d - 111_195.08).abs() < 1.0);
/// ```
pub fn distance_meters(p1: &Position, p2: &Position) -> f64 {
    let lat1 = p1.latitude.to_radians();
    let lat2 = p2.latitude.to_radians();
    let dlat = (p2.latitude - p1.latitude).to_radians();
    let dlon = (p2.longitude - p1.longitude).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// A critical change in station configuration
#[derive(Error, Clone, Debug, PartialEq)]
pub enum ConfigurationDriftError {
    /// Station moved too far
    #[error("configuration drift: station moved {meters:.1} m (limit {limit:.1} m)")]
    Moved {
        /// Distance moved
        meters: f64,
        /// Permitted displacement
        limit: f64,
    },

    /// A critical field changed
    #[error("configuration drift: {field} changed from \"{previous}\" to \"{current}\"")]
    FieldChanged {
        /// Canonical field name
        field: String,
        /// Value in the accepted record
        previous: String,
        /// Value in the new record
        current: String,
    },
}

/// Distance function between two positions, in meters
pub type DistanceFn = fn(&Position, &Position) -> f64;

/// Approves or rejects a day's successive configurations
///
/// Two records are *equivalent* when the station has moved no
/// more than the permitted displacement and the following are
/// unchanged:
///
/// * `rfgain`
/// * `antenna`
/// * each of the three beacon slots
/// * the sample rate
///
/// All other fields may change freely.
#[derive(Clone)]
pub struct ConfigurationGuard {
    distance: DistanceFn,
    max_displacement: f64,
}

impl ConfigurationGuard {
    /// Guard with the default haversine distance and limit
    pub fn new() -> Self {
        Self {
            distance: distance_meters,
            max_displacement: MAX_DISPLACEMENT_M,
        }
    }

    /// Replace the distance function
    pub fn with_distance(&mut self, distance: DistanceFn) -> &mut Self {
        self.distance = distance;
        self
    }

    /// Permitted displacement within a day, in meters
    pub fn with_max_displacement(&mut self, meters: f64) -> &mut Self {
        self.max_displacement = meters;
        self
    }

    /// Permitted displacement within a day, in meters
    pub fn max_displacement(&self) -> f64 {
        self.max_displacement
    }

    /// Check a new record against the accepted one
    ///
    /// Position is checked first. The first differing field
    /// is reported.
    pub fn check(
        &self,
        accepted: &ConfigurationRecord,
        candidate: &ConfigurationRecord,
    ) -> Result<(), ConfigurationDriftError> {
        let meters = (self.distance)(accepted.position(), candidate.position());
        if meters > self.max_displacement {
            return Err(ConfigurationDriftError::Moved {
                meters,
                limit: self.max_displacement,
            });
        }

        for key in CRITICAL_FIELDS {
            let previous = accepted.field(key);
            let current = candidate.field(key);
            if previous != current {
                return Err(changed(
                    key,
                    previous.map(|v| v.to_string()),
                    current.map(|v| v.to_string()),
                ));
            }
        }

        let slots = accepted.beacons().len().max(candidate.beacons().len());
        for slot in 0..slots {
            let previous = accepted.beacons().get(slot);
            let current = candidate.beacons().get(slot);
            if previous != current {
                return Err(changed(
                    &format!("beacon_{}_now_decoded", slot + 1),
                    previous.cloned(),
                    current.cloned(),
                ));
            }
        }

        if accepted.sample_rate() != candidate.sample_rate() {
            return Err(changed(
                "ad_sample_rate",
                Some(accepted.sample_rate().to_string()),
                Some(candidate.sample_rate().to_string()),
            ));
        }

        Ok(())
    }
}

impl std::fmt::Debug for ConfigurationGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationGuard")
            .field("max_displacement", &self.max_displacement)
            .finish_non_exhaustive()
    }
}

impl Default for ConfigurationGuard {
    fn default() -> Self {
        Self::new()
    }
}

const CRITICAL_FIELDS: &[&str] = &["rfgain", "antenna"];

fn changed(field: &str, previous: Option<String>, current: Option<String>) -> ConfigurationDriftError {
    const MISSING: &str = "<missing>";
    ConfigurationDriftError::FieldChanged {
        field: field.to_owned(),
        previous: previous.unwrap_or_else(|| MISSING.to_owned()),
        current: current.unwrap_or_else(|| MISSING.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_approx_eq::assert_approx_eq;

    use crate::header::HeaderMetadataParser;
    use crate::testdata::HEADER;

    fn record(text: &str) -> ConfigurationRecord {
        HeaderMetadataParser::default()
            .parse(text.lines())
            .expect("bad header")
    }

    // move the station north by `meters`
    fn moved(meters: f64) -> String {
        let dlat = (meters / EARTH_RADIUS_M).to_degrees();
        let lat = format!("{:.9}", 42.498340 + dlat);
        HEADER.replacen("42.498340,-71", &format!("{},-71", lat), 1)
    }

    #[test]
    fn test_distance() {
        let a = Position {
            latitude: 42.49834,
            longitude: -71.590725,
            elevation: 128.6,
        };
        assert_eq!(distance_meters(&a, &a), 0.0);

        // one degree of latitude
        let b = Position {
            latitude: 43.49834,
            ..a
        };
        assert_approx_eq!(distance_meters(&a, &b), 111_195.08, 0.01);
        assert_approx_eq!(distance_meters(&b, &a), distance_meters(&a, &b));

        // elevation does not count
        let c = Position {
            elevation: 1000.0,
            ..a
        };
        assert_eq!(distance_meters(&a, &c), 0.0);
    }

    #[test]
    fn test_small_move_is_equivalent() {
        let guard = ConfigurationGuard::default();
        let base = record(HEADER);
        let near = record(&moved(1.0));
        assert_ne!(base.position(), near.position());
        assert_approx_eq!(distance_meters(base.position(), near.position()), 1.0, 0.01);
        assert_eq!(Ok(()), guard.check(&base, &near));

        // free fields may change
        let other = record(&HEADER.replace("AB1XB", "N0CALL"));
        assert_eq!(Ok(()), guard.check(&base, &other));
    }

    #[test]
    fn test_large_move_is_drift() {
        let guard = ConfigurationGuard::default();
        let base = record(HEADER);
        let far = record(&moved(10.0));
        match guard.check(&base, &far) {
            Err(ConfigurationDriftError::Moved { meters, limit }) => {
                assert_approx_eq!(meters, 10.0, 0.01);
                assert_eq!(limit, MAX_DISPLACEMENT_M);
            }
            other => panic!("expected drift, got {:?}", other),
        }

        let mut lenient = ConfigurationGuard::new();
        lenient.with_max_displacement(20.0);
        assert_eq!(lenient.max_displacement(), 20.0);
        assert_eq!(Ok(()), lenient.check(&base, &far));
    }

    #[test]
    fn test_rfgain_is_drift() {
        let guard = ConfigurationGuard::default();
        let base = record(HEADER);
        let text = moved(1.0).replace("RFGain                   10", "RFGain                   20");
        assert_eq!(
            Err(ConfigurationDriftError::FieldChanged {
                field: "rfgain".into(),
                previous: "10".into(),
                current: "20".into(),
            }),
            guard.check(&base, &record(&text))
        );

        let text = HEADER.replace("# RFGain                   10\n", "");
        assert_eq!(
            Err(ConfigurationDriftError::FieldChanged {
                field: "rfgain".into(),
                previous: "10".into(),
                current: "<missing>".into(),
            }),
            guard.check(&base, &record(&text))
        );
    }

    #[test]
    fn test_critical_fields() {
        let guard = ConfigurationGuard::default();
        let base = record(HEADER);

        let text = HEADER.replace("MLA-30+ active wideband loop", "dipole");
        assert!(matches!(
            guard.check(&base, &record(&text)),
            Err(ConfigurationDriftError::FieldChanged { field, .. }) if field == "antenna"
        ));

        let text = HEADER.replace("Beacon 2 Now Decoded     WWV10", "Beacon 2 Now Decoded     WWV20");
        assert_eq!(
            Err(ConfigurationDriftError::FieldChanged {
                field: "beacon_2_now_decoded".into(),
                previous: "WWV10".into(),
                current: "WWV20".into(),
            }),
            guard.check(&base, &record(&text))
        );

        let text = HEADER.replace("Rate          8000", "Rate          16000");
        assert!(matches!(
            guard.check(&base, &record(&text)),
            Err(ConfigurationDriftError::FieldChanged { field, .. }) if field == "ad_sample_rate"
        ));
    }

    #[test]
    fn test_injected_distance() {
        fn always_far(_: &Position, _: &Position) -> f64 {
            1.0e6
        }

        let base = record(HEADER);
        let mut guard = ConfigurationGuard::new();
        guard.with_distance(always_far);
        assert!(matches!(
            guard.check(&base, &base),
            Err(ConfigurationDriftError::Moved { .. })
        ));
    }
}
