//! Captured process variable values
//!
//! A [`SnapshotItem`] pairs one [`ConfigPv`] with the value (and optional
//! readback value) captured when a snapshot was taken. Values are typed
//! payloads with alarm, timestamp and display metadata; they are persisted as
//! JSON text and are opaque to the tree store itself.

use crate::models::ConfigPv;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alarm severity of a captured value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlarmSeverity {
    #[default]
    None,
    Minor,
    Major,
    Invalid,
    Undefined,
}

/// Alarm state attached to a value
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alarm {
    pub severity: AlarmSeverity,
    /// Alarm status as reported by the control system (e.g. `NONE`, `DEVICE`)
    pub status: String,
    pub name: String,
}

impl Alarm {
    /// No alarm
    pub fn none() -> Self {
        Self {
            severity: AlarmSeverity::None,
            status: "NONE".to_string(),
            name: "NONE".to_string(),
        }
    }
}

/// Display metadata for numeric values
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Display {
    #[serde(default)]
    pub units: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_display: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_display: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_alarm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_alarm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_warning: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_warning: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_ctrl: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_ctrl: Option<f64>,
}

/// The raw data of a captured value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum PvData {
    Double(f64),
    Float(f32),
    Long(i64),
    Int(i32),
    Short(i16),
    Byte(i8),
    Boolean(bool),
    String(String),
    Enum { index: i32, labels: Vec<String> },
    DoubleArray(Vec<f64>),
    FloatArray(Vec<f32>),
    LongArray(Vec<i64>),
    IntArray(Vec<i32>),
    StringArray(Vec<String>),
}

/// A typed value with its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PvValue {
    pub data: PvData,
    #[serde(default)]
    pub alarm: Alarm,
    pub time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<Display>,
}

impl PvValue {
    /// Value stamped now with no alarm and no display metadata
    pub fn new(data: PvData) -> Self {
        Self {
            data,
            alarm: Alarm::none(),
            time: Utc::now(),
            display: None,
        }
    }

    pub fn double(value: f64) -> Self {
        Self::new(PvData::Double(value))
    }

    pub fn int(value: i32) -> Self {
        Self::new(PvData::Int(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(PvData::String(value.into()))
    }

    pub fn with_alarm(mut self, alarm: Alarm) -> Self {
        self.alarm = alarm;
        self
    }

    pub fn with_display(mut self, display: Display) -> Self {
        self.display = Some(display);
        self
    }

    /// Numeric scalar view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match &self.data {
            PvData::Double(v) => Some(*v),
            PvData::Float(v) => Some(f64::from(*v)),
            PvData::Long(v) => Some(*v as f64),
            PvData::Int(v) => Some(f64::from(*v)),
            PvData::Short(v) => Some(f64::from(*v)),
            PvData::Byte(v) => Some(f64::from(*v)),
            PvData::Enum { index, .. } => Some(f64::from(*index)),
            _ => None,
        }
    }
}

/// One captured (value, readback value) pair for a ConfigPv within a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotItem {
    /// Unique id of the owning snapshot (empty until persisted)
    #[serde(default)]
    pub snapshot_id: String,

    pub config_pv: ConfigPv,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<PvValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readback_value: Option<PvValue>,
}

impl SnapshotItem {
    pub fn new(config_pv: ConfigPv) -> Self {
        Self {
            snapshot_id: String::new(),
            config_pv,
            value: None,
            readback_value: None,
        }
    }

    pub fn with_value(mut self, value: PvValue) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_readback_value(mut self, value: PvValue) -> Self {
        self.readback_value = Some(value);
        self
    }

    /// Items with neither a value nor a readback value are not stored
    pub fn has_data(&self) -> bool {
        self.value.is_some() || self.readback_value.is_some()
    }
}
