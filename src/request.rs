//! Start requests and their validation.
//!
//! Requests arrive loosely typed (a dashboard form posts numbers as strings),
//! so numeric fields are kept as JSON values until validated here.

use crate::error::ValidationError;
use crate::rds::StationText;
use crate::track::{TrackEntry, is_valid_identifier};
use crate::transmitter::TransmissionParams;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default pause between tracks, in seconds.
pub const DEFAULT_GAP_SECS: f64 = 3.0;

/// A start request in the dashboard's shape: parallel `tracks` and `gaps`
/// arrays, one gap between each adjacent pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub frequency: Option<Value>,
    #[serde(default)]
    pub ps: Option<String>,
    #[serde(default)]
    pub rt: Option<String>,
    #[serde(default)]
    pub tracks: Vec<String>,
    #[serde(default)]
    pub gaps: Vec<Value>,
}

/// A validated request: everything `PlaybackScheduler` needs to begin a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub params: TransmissionParams,
    pub entries: Vec<TrackEntry>,
}

impl StartRequest {
    /// Validate the request. The last track has no gap in the request and
    /// gets `default_gap` before the queue wraps.
    pub fn into_plan(self, default_gap: f64) -> Result<RunPlan, ValidationError> {
        let frequency = parse_frequency(self.frequency.as_ref())?;

        if self.tracks.is_empty() {
            return Err(ValidationError::EmptyQueue);
        }
        let expected = self.tracks.len() - 1;
        if self.gaps.len() != expected {
            return Err(ValidationError::GapCountMismatch {
                tracks: self.tracks.len(),
                expected,
                got: self.gaps.len(),
            });
        }

        let mut gaps = self
            .gaps
            .iter()
            .enumerate()
            .map(|(i, v)| parse_gap(i, v))
            .collect::<Result<Vec<_>, _>>()?;
        gaps.push(default_gap);

        let entries = self
            .tracks
            .into_iter()
            .zip(gaps)
            .map(|(file, gap)| TrackEntry { file, gap })
            .collect();

        validate_plan(RunPlan {
            params: TransmissionParams {
                frequency,
                station: StationText::new(self.ps, self.rt),
            },
            entries,
        })
    }
}

/// Check a plan built from `TrackEntry` values directly.
pub fn validate_plan(plan: RunPlan) -> Result<RunPlan, ValidationError> {
    let f = plan.params.frequency;
    if !f.is_finite() || f <= 0.0 {
        return Err(ValidationError::InvalidFrequency(f.to_string()));
    }
    if plan.entries.is_empty() {
        return Err(ValidationError::EmptyQueue);
    }
    for (index, entry) in plan.entries.iter().enumerate() {
        if !is_valid_identifier(&entry.file) {
            return Err(ValidationError::InvalidTrack(entry.file.clone()));
        }
        if !entry.gap.is_finite() {
            return Err(ValidationError::NonNumericGap {
                index,
                value: entry.gap.to_string(),
            });
        }
        if entry.gap < 0.0 {
            return Err(ValidationError::NegativeGap {
                index,
                value: entry.gap,
            });
        }
    }
    Ok(plan)
}

fn number_of(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|v| v.is_finite())
}

fn parse_frequency(value: Option<&Value>) -> Result<f64, ValidationError> {
    let value = match value {
        None | Some(Value::Null) => return Err(ValidationError::MissingFrequency),
        Some(Value::String(s)) if s.trim().is_empty() => {
            return Err(ValidationError::MissingFrequency);
        }
        Some(v) => v,
    };
    match number_of(value) {
        Some(f) if f > 0.0 => Ok(f),
        _ => Err(ValidationError::InvalidFrequency(value.to_string())),
    }
}

fn parse_gap(index: usize, value: &Value) -> Result<f64, ValidationError> {
    let gap = number_of(value).ok_or_else(|| ValidationError::NonNumericGap {
        index,
        value: value.to_string(),
    })?;
    if gap < 0.0 {
        return Err(ValidationError::NegativeGap { index, value: gap });
    }
    Ok(gap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(tracks: &[&str], gaps: Vec<Value>) -> StartRequest {
        StartRequest {
            frequency: Some(json!(99.5)),
            ps: Some("PIRATE".into()),
            rt: None,
            tracks: tracks.iter().map(|s| s.to_string()).collect(),
            gaps,
        }
    }

    #[test]
    fn valid_request_builds_entries() {
        let plan = request(&["a.wav", "b.wav"], vec![json!(2)])
            .into_plan(DEFAULT_GAP_SECS)
            .unwrap();
        assert_eq!(plan.params.frequency, 99.5);
        assert_eq!(plan.params.station.ps.as_deref(), Some("PIRATE"));
        assert_eq!(
            plan.entries,
            vec![TrackEntry::new("a.wav", 2.0), TrackEntry::new("b.wav", 3.0)]
        );
    }

    #[test]
    fn single_track_needs_no_gaps() {
        let plan = request(&["a.wav"], vec![]).into_plan(1.5).unwrap();
        assert_eq!(plan.entries, vec![TrackEntry::new("a.wav", 1.5)]);
    }

    #[test]
    fn gaps_accept_numeric_strings() {
        let plan = request(&["a.wav", "b.wav"], vec![json!(" 4.5 ")])
            .into_plan(DEFAULT_GAP_SECS)
            .unwrap();
        assert_eq!(plan.entries[0].gap, 4.5);
    }

    #[test]
    fn frequency_accepts_numeric_string() {
        let mut req = request(&["a.wav"], vec![]);
        req.frequency = Some(json!("101.1"));
        assert_eq!(req.into_plan(3.0).unwrap().params.frequency, 101.1);
    }

    #[test]
    fn missing_frequency_rejected() {
        let mut req = request(&["a.wav"], vec![]);
        req.frequency = None;
        assert_eq!(
            req.clone().into_plan(3.0).unwrap_err(),
            ValidationError::MissingFrequency
        );
        req.frequency = Some(json!(""));
        assert_eq!(req.into_plan(3.0).unwrap_err(), ValidationError::MissingFrequency);
    }

    #[test]
    fn bad_frequency_rejected() {
        let mut req = request(&["a.wav"], vec![]);
        req.frequency = Some(json!("loud"));
        assert!(matches!(
            req.clone().into_plan(3.0),
            Err(ValidationError::InvalidFrequency(_))
        ));
        req.frequency = Some(json!(-88.0));
        assert!(matches!(
            req.into_plan(3.0),
            Err(ValidationError::InvalidFrequency(_))
        ));
    }

    #[test]
    fn empty_track_list_rejected() {
        let err = request(&[], vec![]).into_plan(3.0).unwrap_err();
        assert_eq!(err, ValidationError::EmptyQueue);
    }

    #[test]
    fn gap_count_mismatch_rejected() {
        let err = request(&["a.wav", "b.wav"], vec![json!(1), json!(2)])
            .into_plan(3.0)
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::GapCountMismatch {
                tracks: 2,
                expected: 1,
                got: 2
            }
        );
        let err = request(&["a.wav", "b.wav", "c.wav"], vec![json!(1)])
            .into_plan(3.0)
            .unwrap_err();
        assert!(matches!(err, ValidationError::GapCountMismatch { .. }));
    }

    #[test]
    fn negative_gap_rejected() {
        let err = request(&["a.wav", "b.wav"], vec![json!(-1)])
            .into_plan(3.0)
            .unwrap_err();
        assert_eq!(err, ValidationError::NegativeGap { index: 0, value: -1.0 });
    }

    #[test]
    fn non_numeric_gap_rejected() {
        for bad in [json!("soon"), json!(null), json!([1]), json!(true)] {
            let err = request(&["a.wav", "b.wav"], vec![bad])
                .into_plan(3.0)
                .unwrap_err();
            assert!(matches!(err, ValidationError::NonNumericGap { index: 0, .. }));
        }
    }

    #[test]
    fn parent_dir_identifier_rejected() {
        let err = request(&["../secret.wav"], vec![]).into_plan(3.0).unwrap_err();
        assert_eq!(err, ValidationError::InvalidTrack("../secret.wav".into()));
    }

    #[test]
    fn validate_plan_checks_entry_gaps() {
        let plan = RunPlan {
            params: TransmissionParams {
                frequency: 99.5,
                station: StationText::default(),
            },
            entries: vec![TrackEntry::new("a.wav", f64::NAN)],
        };
        assert!(matches!(
            validate_plan(plan),
            Err(ValidationError::NonNumericGap { .. })
        ));
    }

    #[test]
    fn request_deserializes_from_dashboard_json() {
        let json = r#"{"frequency":"99.5","ps":"PIRATE","tracks":["a.wav","b.wav"],"gaps":["2"]}"#;
        let req: StartRequest = serde_json::from_str(json).unwrap();
        let plan = req.into_plan(3.0).unwrap();
        assert_eq!(plan.entries[0].gap, 2.0);
        assert_eq!(plan.entries[1].gap, 3.0);
    }
}
