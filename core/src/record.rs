//! Persisted activation records and their stable text encoding.
//!
//! A record reads `{category}|{hierarchyPath}|{x},{y},{z}|{archetypeSetId}` with
//! coordinates printed to three decimals; lists of records are joined with `;`.
//! Restoration depends on this text alone, so the layout must stay stable.

use std::{fmt, str::FromStr};

use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ArchetypeSetId, Category, RECORD_FIELD_DELIMITER, RECORD_LIST_DELIMITER};

const MILLI: f32 = 1_000.0;

/// Position rounded to thousandths of a world unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QuantizedPosition {
    x: i64,
    y: i64,
    z: i64,
}

impl QuantizedPosition {
    /// Quantizes a world-space position.
    #[must_use]
    pub fn from_vec3(position: Vec3) -> Self {
        Self {
            x: quantize(position.x),
            y: quantize(position.y),
            z: quantize(position.z),
        }
    }

    /// Converts the quantized position back to world space.
    #[must_use]
    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(
            self.x as f32 / MILLI,
            self.y as f32 / MILLI,
            self.z as f32 / MILLI,
        )
    }
}

impl fmt::Display for QuantizedPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_milli(f, self.x)?;
        f.write_str(",")?;
        write_milli(f, self.y)?;
        f.write_str(",")?;
        write_milli(f, self.z)
    }
}

impl FromStr for QuantizedPosition {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut parts = value.split(',');
        let mut next = || -> Result<i64, ()> {
            let part = parts.next().ok_or(())?;
            let parsed: f64 = part.trim().parse().map_err(|_| ())?;
            if !parsed.is_finite() {
                return Err(());
            }
            Ok((parsed * f64::from(MILLI)).round() as i64)
        };
        let x = next()?;
        let y = next()?;
        let z = next()?;
        if parts.next().is_some() {
            return Err(());
        }
        Ok(Self { x, y, z })
    }
}

fn quantize(value: f32) -> i64 {
    (f64::from(value) * f64::from(MILLI)).round() as i64
}

fn write_milli(f: &mut fmt::Formatter<'_>, value: i64) -> fmt::Result {
    let sign = if value < 0 { "-" } else { "" };
    let magnitude = value.unsigned_abs();
    write!(f, "{sign}{}.{:03}", magnitude / 1_000, magnitude % 1_000)
}

/// Stable identity of a marker across scene reloads: hierarchy path plus
/// quantized position.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerKey {
    path: String,
    position: QuantizedPosition,
}

impl MarkerKey {
    /// Creates a key for a marker found at `path` and `position`.
    #[must_use]
    pub fn new(path: impl Into<String>, position: Vec3) -> Self {
        Self {
            path: path.into(),
            position: QuantizedPosition::from_vec3(position),
        }
    }

    /// Hierarchy path of the marker inside the authored scene.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Quantized position of the marker.
    #[must_use]
    pub const fn position(&self) -> QuantizedPosition {
        self.position
    }
}

impl fmt::Display for MarkerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{RECORD_FIELD_DELIMITER}{}", self.path, self.position)
    }
}

/// Persisted proof that a marker was activated with a given archetype set.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActivationRecord {
    category: Category,
    key: MarkerKey,
    archetype_set: ArchetypeSetId,
}

impl ActivationRecord {
    /// Creates a record for an activated marker.
    #[must_use]
    pub fn new(category: Category, key: MarkerKey, archetype_set: ArchetypeSetId) -> Self {
        Self {
            category,
            key,
            archetype_set,
        }
    }

    /// Category of the activated marker.
    #[must_use]
    pub fn category(&self) -> &Category {
        &self.category
    }

    /// Stable key of the activated marker.
    #[must_use]
    pub fn key(&self) -> &MarkerKey {
        &self.key
    }

    /// Archetype set chosen on activation.
    #[must_use]
    pub fn archetype_set(&self) -> &ArchetypeSetId {
        &self.archetype_set
    }
}

impl fmt::Display for ActivationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{RECORD_FIELD_DELIMITER}{}{RECORD_FIELD_DELIMITER}{}",
            self.category, self.key, self.archetype_set
        )
    }
}

impl FromStr for ActivationRecord {
    type Err = RecordParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.is_empty() {
            return Err(RecordParseError::Empty);
        }

        let fields: Vec<&str> = value.split(RECORD_FIELD_DELIMITER).collect();
        let [category, path, coordinates, archetype_set] = fields.as_slice() else {
            return Err(RecordParseError::FieldCount(value.to_owned()));
        };

        if category.is_empty() || path.is_empty() || archetype_set.is_empty() {
            return Err(RecordParseError::EmptyField(value.to_owned()));
        }

        let position: QuantizedPosition = coordinates
            .parse()
            .map_err(|()| RecordParseError::Coordinates(value.to_owned()))?;

        Ok(Self {
            category: Category::new(*category),
            key: MarkerKey {
                path: (*path).to_owned(),
                position,
            },
            archetype_set: ArchetypeSetId::new(*archetype_set),
        })
    }
}

impl TryFrom<String> for ActivationRecord {
    type Error = RecordParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ActivationRecord> for String {
    fn from(record: ActivationRecord) -> Self {
        record.to_string()
    }
}

/// Reasons a persisted activation record cannot be decoded.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RecordParseError {
    /// The record text was empty.
    #[error("activation record is empty")]
    Empty,
    /// The record did not contain exactly four fields.
    #[error("activation record `{0}` must contain four `|`-separated fields")]
    FieldCount(String),
    /// One of the textual fields was empty.
    #[error("activation record `{0}` has an empty field")]
    EmptyField(String),
    /// The coordinate field was not three comma-separated numbers.
    #[error("activation record `{0}` has malformed coordinates")]
    Coordinates(String),
}

/// Outcome of decoding a persisted record list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodedRecords {
    /// Records that decoded successfully, in stored order.
    pub records: Vec<ActivationRecord>,
    /// Entries that could not be decoded.
    pub rejected: Vec<RecordParseError>,
}

/// Joins records into the persisted list form.
#[must_use]
pub fn encode_records(records: &[ActivationRecord]) -> String {
    let mut encoded = String::new();
    for (index, record) in records.iter().enumerate() {
        if index > 0 {
            encoded.push(RECORD_LIST_DELIMITER);
        }
        encoded.push_str(&record.to_string());
    }
    encoded
}

/// Splits a persisted list, keeping every well-formed record.
///
/// Blank segments (such as a trailing delimiter) are skipped silently.
#[must_use]
pub fn decode_records(encoded: &str) -> DecodedRecords {
    let mut decoded = DecodedRecords::default();
    for segment in encoded.split(RECORD_LIST_DELIMITER) {
        if segment.trim().is_empty() {
            continue;
        }
        match segment.parse::<ActivationRecord>() {
            Ok(record) => decoded.records.push(record),
            Err(error) => decoded.rejected.push(error),
        }
    }
    decoded
}

/// Reports whether `text` contains a character reserved by the record encoding.
#[must_use]
pub fn contains_reserved(text: &str) -> bool {
    text.contains([RECORD_FIELD_DELIMITER, RECORD_LIST_DELIMITER])
}
