//! Maps vendor values onto the canonical per-device field schema.

use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::{
    config::{DeviceConfig, DeviceKind},
    error::IngestError,
    reading::{FieldValue, Quantity, RawReading, Reading, Unit},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Float,
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,

    pub quantity: Quantity,

    pub unit: Unit,

    pub kind: FieldKind,

    /// Plausible range in `unit`; anything outside discards the reading.
    pub valid: Option<RangeInclusive<f64>>,
}

// -50..=80 °C, the range the Aranet4 can physically report.
const TEMPERATURE_F_RANGE: RangeInclusive<f64> = -58.0..=176.0;

const ARANET4_SCHEMA: &[FieldSpec] = &[
    FieldSpec {
        name: "co2",
        quantity: Quantity::Co2,
        unit: Unit::Ppm,
        kind: FieldKind::Integer,
        valid: Some(1.0..=f64::MAX),
    },
    FieldSpec {
        name: "temperature_f",
        quantity: Quantity::Temperature,
        unit: Unit::Fahrenheit,
        kind: FieldKind::Float,
        valid: Some(TEMPERATURE_F_RANGE),
    },
    FieldSpec {
        name: "humidity",
        quantity: Quantity::Humidity,
        unit: Unit::Percent,
        kind: FieldKind::Integer,
        valid: Some(0.0..=100.0),
    },
    FieldSpec {
        name: "pressure",
        quantity: Quantity::Pressure,
        unit: Unit::HectoPascal,
        kind: FieldKind::Float,
        valid: None,
    },
    FieldSpec {
        name: "battery",
        quantity: Quantity::Battery,
        unit: Unit::Percent,
        kind: FieldKind::Integer,
        valid: Some(0.0..=100.0),
    },
];

const EVE_ROOM_SCHEMA: &[FieldSpec] = &[
    FieldSpec {
        name: "temperature_f",
        quantity: Quantity::Temperature,
        unit: Unit::Fahrenheit,
        kind: FieldKind::Float,
        valid: Some(TEMPERATURE_F_RANGE),
    },
    FieldSpec {
        name: "humidity",
        quantity: Quantity::Humidity,
        unit: Unit::Percent,
        kind: FieldKind::Float,
        valid: Some(0.0..=100.0),
    },
    FieldSpec {
        name: "voc_ppb",
        quantity: Quantity::Voc,
        unit: Unit::Ppb,
        kind: FieldKind::Integer,
        valid: Some(0.0..=f64::MAX),
    },
    FieldSpec {
        name: "battery",
        quantity: Quantity::Battery,
        unit: Unit::Percent,
        kind: FieldKind::Integer,
        valid: Some(0.0..=100.0),
    },
];

pub fn schema(kind: DeviceKind) -> &'static [FieldSpec] {
    match kind {
        DeviceKind::Aranet4 => ARANET4_SCHEMA,
        DeviceKind::EveRoom => EVE_ROOM_SCHEMA,
    }
}

#[derive(Debug)]
pub struct Normalized {
    pub reading: Reading,

    /// Schema fields left out of `reading`, each as an `UnsupportedField`.
    pub dropped: Vec<IngestError>,
}

pub fn normalize(
    device: &DeviceConfig,
    raw: &RawReading,
    measured_at: DateTime<Utc>,
) -> Result<Normalized, IngestError> {
    let mut fields = IndexMap::new();
    let mut dropped = Vec::new();

    for spec in schema(device.kind) {
        let Some(measure) = raw.get(spec.quantity) else {
            dropped.push(unsupported(device, spec, "not reported by device"));
            continue;
        };

        let Some(value) = measure.unit.convert(measure.value, spec.unit) else {
            dropped.push(unsupported(
                device,
                spec,
                format!("cannot convert {} to {}", measure.unit, spec.unit),
            ));
            continue;
        };

        if !value.is_finite() {
            return Err(IngestError::invalid(
                &device.name,
                format!("{} is not a finite number: {value}", spec.name),
            ));
        }

        if let Some(valid) = &spec.valid
            && !valid.contains(&value)
        {
            return Err(IngestError::invalid(
                &device.name,
                format!("{} out of range: {value}{}", spec.name, spec.unit),
            ));
        }

        let value = match spec.kind {
            FieldKind::Integer => FieldValue::Integer(value.round() as i64),
            FieldKind::Float => FieldValue::Float(value),
        };
        fields.insert(spec.name, value);
    }

    if fields.is_empty() {
        return Err(IngestError::invalid(
            &device.name,
            "no schema field could be filled",
        ));
    }

    Ok(Normalized {
        reading: Reading {
            device: device.name.clone(),
            location: device.location.clone(),
            measured_at,
            fields,
        },
        dropped,
    })
}

fn unsupported(device: &DeviceConfig, spec: &FieldSpec, reason: impl Into<String>) -> IngestError {
    IngestError::UnsupportedField {
        device: device.name.clone(),
        field: spec.name,
        reason: reason.into(),
    }
}
