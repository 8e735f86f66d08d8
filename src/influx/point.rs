use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::{
    config::DeviceConfig,
    reading::{FieldValue, Reading},
};

#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,

    pub tags: IndexMap<String, String>,

    pub fields: IndexMap<String, FieldValue>,

    pub timestamp: DateTime<Utc>,
}

impl Point {
    pub fn from_reading(reading: &Reading, device: &DeviceConfig) -> Self {
        let mut tags = IndexMap::new();
        tags.insert("device".to_string(), reading.device.clone());
        tags.insert("location".to_string(), reading.location.clone());
        tags.insert(device.id.tag_key().to_string(), device.id.to_string());

        let fields = reading
            .fields
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect();

        Self {
            measurement: device.measurement.clone(),
            tags,
            fields,
            timestamp: reading.measured_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;
    use crate::config::{DeviceId, DeviceKind};

    #[test]
    fn builds_reference_aranet4_point() {
        let device = DeviceConfig::new(
            DeviceKind::Aranet4,
            DeviceId::Mac("DF:C1:53:75:BA:4E".parse().unwrap()),
            "aranet4",
            "office",
        );
        let measured_at = Utc.with_ymd_and_hms(2025, 6, 9, 17, 17, 38).unwrap();
        let reading = Reading {
            device: "aranet4".to_string(),
            location: "office".to_string(),
            measured_at,
            fields: IndexMap::from([
                ("co2", FieldValue::Integer(450)),
                ("temperature_f", FieldValue::Float(72.1)),
                ("humidity", FieldValue::Integer(40)),
                ("pressure", FieldValue::Float(1013.0)),
                ("battery", FieldValue::Integer(90)),
            ]),
        };

        let point = Point::from_reading(&reading, &device);

        let expected = Point {
            measurement: "aranet4_readings".to_string(),
            tags: IndexMap::from([
                ("device".to_string(), "aranet4".to_string()),
                ("location".to_string(), "office".to_string()),
                ("mac_address".to_string(), "DF:C1:53:75:BA:4E".to_string()),
            ]),
            fields: IndexMap::from([
                ("co2".to_string(), FieldValue::Integer(450)),
                ("temperature_f".to_string(), FieldValue::Float(72.1)),
                ("humidity".to_string(), FieldValue::Integer(40)),
                ("pressure".to_string(), FieldValue::Float(1013.0)),
                ("battery".to_string(), FieldValue::Integer(90)),
            ]),
            timestamp: measured_at,
        };
        assert_eq!(point, expected);
    }

    #[test]
    fn hub_entities_are_tagged_by_entity_id() {
        let device = DeviceConfig::new(
            DeviceKind::EveRoom,
            DeviceId::Entity("sensor.eve_room_1c22".to_string()),
            "eve_room_1c22",
            "bedroom",
        );
        let reading = Reading {
            device: device.name.clone(),
            location: device.location.clone(),
            measured_at: Utc::now(),
            fields: IndexMap::from([("temperature_f", FieldValue::Float(70.2))]),
        };

        let point = Point::from_reading(&reading, &device);

        assert_eq!(point.measurement, "eve_room_readings");
        assert_eq!(point.tags["entity_id"], "sensor.eve_room_1c22");
        assert!(!point.tags.contains_key("mac_address"));
    }
}
