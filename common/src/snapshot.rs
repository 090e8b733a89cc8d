use serde::{Deserialize, Serialize};
use std::fmt;

/// A color in hue/saturation/value form, every channel in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Hsv {
    pub h: f64,
    pub s: f64,
    pub v: f64,
}

impl Hsv {
    pub const BLACK: Hsv = Hsv {
        h: 0.0,
        s: 0.0,
        v: 0.0,
    };

    pub fn new(h: f64, s: f64, v: f64) -> Self {
        Self { h, s, v }
    }
}

impl fmt::Display for Hsv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.h, self.s, self.v)
    }
}

/// One reading of the tracked lighting state at a single instant.
///
/// A valid snapshot holds one color per hue region and one temperature (Kelvin)
/// per temperature region, in region order. An invalid snapshot holds nothing
/// and stands for "no reliable reading here" (missing frame, wrong scene, or a
/// failed extraction).
///
/// Snapshots are never mutated; [`StateSnapshot::at`] returns a re-timestamped copy.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    hues: Vec<Hsv>,
    temps: Vec<f64>,
    timestamp: f64,
    valid: bool,
}

impl StateSnapshot {
    /// Create a valid snapshot. The timestamp starts at 0 until the caller places it.
    pub fn new(hues: Vec<Hsv>, temps: Vec<f64>) -> Self {
        Self {
            hues,
            temps,
            timestamp: 0.0,
            valid: true,
        }
    }

    /// Create the "no data" snapshot at `timestamp`.
    pub fn invalid(timestamp: f64) -> Self {
        Self {
            hues: Vec::new(),
            temps: Vec::new(),
            timestamp,
            valid: false,
        }
    }

    /// The same reading placed at a different instant.
    pub fn at(self, timestamp: f64) -> Self {
        Self { timestamp, ..self }
    }

    // -- Accessors ---------------------------------------------------------------

    pub fn hues(&self) -> &[Hsv] {
        &self.hues
    }

    pub fn temps(&self) -> &[f64] {
        &self.temps
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

impl fmt::Display for StateSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.valid {
            return write!(f, "{:.2}s: invalid", self.timestamp);
        }
        write!(f, "{:.2}s: [", self.timestamp)?;
        for (i, hue) in self.hues.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{hue}")?;
        }
        f.write_str("] [")?;
        for (i, temp) in self.temps.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{temp:.0}K")?;
        }
        f.write_str("]")
    }
}

// -- Persisted format -------------------------------------------------------------
//
// {
//   "url": "<video url>",
//   "updates": [
//     { "time": 12.5, "hue": [[h, s, v], ...], "temp": [4200.0, ...] },
//     ...
//   ]
// }
//
// Field order is part of the format; serde keeps declaration order.

#[derive(Serialize, Deserialize)]
struct ResultFile {
    url: String,
    updates: Vec<UpdateRecord>,
}

#[derive(Serialize, Deserialize)]
struct UpdateRecord {
    time: f64,
    hue: Vec<[f64; 3]>,
    temp: Vec<f64>,
}

impl From<&StateSnapshot> for UpdateRecord {
    fn from(snapshot: &StateSnapshot) -> Self {
        Self {
            time: snapshot.timestamp,
            hue: snapshot.hues.iter().map(|c| [c.h, c.s, c.v]).collect(),
            temp: snapshot.temps.clone(),
        }
    }
}

impl UpdateRecord {
    fn into_snapshot(self, index: usize) -> Result<StateSnapshot, FormatError> {
        if !(self.time >= 0.0) {
            return Err(FormatError::NegativeTime {
                index,
                value: self.time,
            });
        }
        let mut hues = Vec::with_capacity(self.hue.len());
        for (region, [h, s, v]) in self.hue.into_iter().enumerate() {
            for (channel, value) in [("h", h), ("s", s), ("v", v)] {
                if !(0.0..=1.0).contains(&value) {
                    return Err(FormatError::HueOutOfRange {
                        index,
                        region,
                        channel,
                        value,
                    });
                }
            }
            hues.push(Hsv::new(h, s, v));
        }
        for (region, &value) in self.temp.iter().enumerate() {
            if !(value >= 0.0) {
                return Err(FormatError::NegativeTemperature {
                    index,
                    region,
                    value,
                });
            }
        }
        Ok(StateSnapshot::new(hues, self.temp).at(self.time))
    }
}

/// Serialize snapshots into the result format. Invalid snapshots are skipped.
///
/// `compact` drops all formatting whitespace.
pub fn to_json(snapshots: &[StateSnapshot], url: &str, compact: bool) -> Result<String, FormatError> {
    let file = ResultFile {
        url: url.to_string(),
        updates: snapshots
            .iter()
            .filter(|s| s.is_valid())
            .map(UpdateRecord::from)
            .collect(),
    };
    let json = if compact {
        serde_json::to_string(&file)?
    } else {
        serde_json::to_string_pretty(&file)?
    };
    Ok(json)
}

/// Parse and validate a result file, returning its url and the snapshots in file order.
pub fn from_json(data: &str) -> Result<(String, Vec<StateSnapshot>), FormatError> {
    let file: ResultFile = serde_json::from_str(data)?;
    let snapshots = file
        .updates
        .into_iter()
        .enumerate()
        .map(|(index, record)| record.into_snapshot(index))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((file.url, snapshots))
}

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("malformed result file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("updates[{index}].time must be >= 0, got {value}")]
    NegativeTime { index: usize, value: f64 },
    #[error("updates[{index}].hue[{region}].{channel} must lie in [0, 1], got {value}")]
    HueOutOfRange {
        index: usize,
        region: usize,
        channel: &'static str,
        value: f64,
    },
    #[error("updates[{index}].temp[{region}] must be >= 0, got {value}")]
    NegativeTemperature { index: usize, region: usize, value: f64 },
}
