use chrono::{DateTime, Utc};
use std::fmt;

/// One observed value, exactly as the sensor published it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    topic: String,
    value: String,
    received_at: DateTime<Utc>,
}

impl Reading {
    pub fn new(topic: impl Into<String>, value: impl Into<String>, received_at: DateTime<Utc>) -> Self {
        Self {
            topic: topic.into(),
            value: value.into(),
            received_at,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn sensor_kind(&self) -> SensorKind {
        SensorKind::from_topic(&self.topic)
    }

    /// The value as a number, if it parses as one. Stored values are never
    /// rewritten; this is only a hint for logging.
    pub fn numeric_value(&self) -> Option<f64> {
        self.value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

/// Sensor family inferred from the last topic segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    Temperature,
    Humidity,
    SoilMoisture,
    Distance,
    Other,
}

impl SensorKind {
    pub fn from_topic(topic: &str) -> Self {
        let leaf = topic.rsplit('/').next().unwrap_or_default().to_ascii_lowercase();
        match leaf.as_str() {
            "temperature" => SensorKind::Temperature,
            "humidity" => SensorKind::Humidity,
            "moisture" => SensorKind::SoilMoisture,
            "distance" => SensorKind::Distance,
            _ => SensorKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "temperature",
            SensorKind::Humidity => "humidity",
            SensorKind::SoilMoisture => "soil_moisture",
            SensorKind::Distance => "distance",
            SensorKind::Other => "other",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
