use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantity {
    Co2,
    Temperature,
    Humidity,
    Pressure,
    Battery,
    Voc,
}

impl Quantity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quantity::Co2 => "co2",
            Quantity::Temperature => "temperature",
            Quantity::Humidity => "humidity",
            Quantity::Pressure => "pressure",
            Quantity::Battery => "battery",
            Quantity::Voc => "voc",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Celsius,
    Fahrenheit,
    Percent,
    Ppm,
    Ppb,
    HectoPascal,
    KiloPascal,
    Atmosphere,
}

impl Unit {
    /// Parses the unit symbols vendors and Home Assistant report.
    pub fn from_symbol(symbol: &str) -> Option<Unit> {
        match symbol.trim() {
            "°C" | "C" | "celsius" => Some(Unit::Celsius),
            "°F" | "F" | "fahrenheit" => Some(Unit::Fahrenheit),
            "%" => Some(Unit::Percent),
            "ppm" => Some(Unit::Ppm),
            "ppb" => Some(Unit::Ppb),
            "hPa" | "mbar" => Some(Unit::HectoPascal),
            "kPa" => Some(Unit::KiloPascal),
            "atm" => Some(Unit::Atmosphere),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::Celsius => "°C",
            Unit::Fahrenheit => "°F",
            Unit::Percent => "%",
            Unit::Ppm => "ppm",
            Unit::Ppb => "ppb",
            Unit::HectoPascal => "hPa",
            Unit::KiloPascal => "kPa",
            Unit::Atmosphere => "atm",
        }
    }

    /// Returns `None` when the two units measure different things.
    pub fn convert(self, value: f64, to: Unit) -> Option<f64> {
        use Unit::*;

        match (self, to) {
            (from, to) if from == to => Some(value),
            (Celsius, Fahrenheit) => Some(value * 9.0 / 5.0 + 32.0),
            (Fahrenheit, Celsius) => Some((value - 32.0) * 5.0 / 9.0),
            (Ppm, Ppb) => Some(value * 1000.0),
            (Ppb, Ppm) => Some(value / 1000.0),
            (Atmosphere, HectoPascal) => Some(value * 1013.25),
            (KiloPascal, HectoPascal) => Some(value * 10.0),
            (HectoPascal, Atmosphere) => Some(value / 1013.25),
            (HectoPascal, KiloPascal) => Some(value / 10.0),
            _ => None,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawMeasure {
    pub quantity: Quantity,

    pub value: f64,

    pub unit: Unit,
}

/// Vendor values as a device reader returned them, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawReading {
    pub measures: Vec<RawMeasure>,
}

impl RawReading {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, quantity: Quantity, value: f64, unit: Unit) -> Self {
        self.push(quantity, value, unit);
        self
    }

    pub fn push(&mut self, quantity: Quantity, value: f64, unit: Unit) {
        self.measures.push(RawMeasure {
            quantity,
            value,
            unit,
        });
    }

    pub fn get(&self, quantity: Quantity) -> Option<&RawMeasure> {
        self.measures.iter().find(|m| m.quantity == quantity)
    }

    pub fn is_empty(&self) -> bool {
        self.measures.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
}

impl FieldValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            FieldValue::Integer(v) => *v as f64,
            FieldValue::Float(v) => *v,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(v) => write!(f, "{v}"),
            FieldValue::Float(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub device: String,

    pub location: String,

    pub measured_at: DateTime<Utc>,

    pub fields: IndexMap<&'static str, FieldValue>,
}

impl Reading {
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        self.fields.get(name).copied()
    }

    pub fn summary(&self) -> String {
        self.fields
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
