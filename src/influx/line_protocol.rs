//! InfluxDB line protocol encoding.
//!
//! ```text
//! measurement,tag1=val1,tag2=val2 field1=val1,field2=val2 timestamp_ns
//! ```
//!
//! Ref: <https://docs.influxdata.com/influxdb/v2/reference/syntax/line-protocol/>

use crate::{error::IngestError, influx::Point, reading::FieldValue};

pub fn to_line_protocol(point: &Point) -> Result<String, IngestError> {
    if point.fields.is_empty() {
        return Err(IngestError::write_rejected(format!(
            "point for {} has no fields",
            point.measurement
        )));
    }

    let timestamp_ns = point.timestamp.timestamp_nanos_opt().ok_or_else(|| {
        IngestError::write_rejected(format!(
            "timestamp out of nanosecond range: {}",
            point.timestamp
        ))
    })?;

    let mut line = escape_measurement(&point.measurement);

    // An empty tag value is a syntax error, so such tags are left out.
    let mut tags: Vec<_> = point
        .tags
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .collect();
    tags.sort_by(|a, b| a.0.cmp(b.0));
    for (key, value) in tags {
        line.push(',');
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&escape_key(value));
    }

    line.push(' ');

    for (i, (key, value)) in point.fields.iter().enumerate() {
        if i > 0 {
            line.push(',');
        }
        line.push_str(&escape_key(key));
        line.push('=');
        line.push_str(&encode_field_value(key, value)?);
    }

    line.push(' ');
    line.push_str(&timestamp_ns.to_string());

    Ok(line)
}

pub fn encode_batch(points: &[Point]) -> Result<String, IngestError> {
    let lines = points
        .iter()
        .map(to_line_protocol)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(lines.join("\n"))
}

fn encode_field_value(key: &str, value: &FieldValue) -> Result<String, IngestError> {
    match value {
        FieldValue::Integer(v) => Ok(format!("{v}i")),
        FieldValue::Float(v) if v.is_finite() => Ok(format!("{v}")),
        FieldValue::Float(v) => Err(IngestError::write_rejected(format!(
            "field {key} is not finite: {v}"
        ))),
    }
}

// Measurement names only need commas and spaces escaped.
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

// Tag keys, tag values and field keys share the same rules.
fn escape_key(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use indexmap::IndexMap;

    use super::*;

    fn point(
        measurement: &str,
        tags: &[(&str, &str)],
        fields: &[(&str, FieldValue)],
        timestamp_ns: i64,
    ) -> Point {
        Point {
            measurement: measurement.to_string(),
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            fields: fields.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            timestamp: DateTime::from_timestamp_nanos(timestamp_ns),
        }
    }

    #[test]
    fn encodes_aranet4_point() {
        let p = point(
            "aranet4_readings",
            &[
                ("mac_address", "DF:C1:53:75:BA:4E"),
                ("device", "aranet4"),
                ("location", "office"),
            ],
            &[
                ("co2", FieldValue::Integer(450)),
                ("temperature_f", FieldValue::Float(72.1)),
                ("humidity", FieldValue::Integer(40)),
                ("pressure", FieldValue::Float(1013.2)),
                ("battery", FieldValue::Integer(90)),
            ],
            1_749_489_458_000_000_000,
        );

        assert_eq!(
            to_line_protocol(&p).unwrap(),
            "aranet4_readings,device=aranet4,location=office,mac_address=DF:C1:53:75:BA:4E \
             co2=450i,temperature_f=72.1,humidity=40i,pressure=1013.2,battery=90i \
             1749489458000000000"
        );
    }

    #[test]
    fn escapes_special_characters() {
        let p = point(
            "my measurement",
            &[("location", "living room,east")],
            &[("a=b", FieldValue::Float(1.5))],
            3_000_000_000,
        );

        assert_eq!(
            to_line_protocol(&p).unwrap(),
            "my\\ measurement,location=living\\ room\\,east a\\=b=1.5 3000000000"
        );
    }

    #[test]
    fn omits_empty_tag_values() {
        let p = point(
            "aranet4_readings",
            &[("device", "aranet4"), ("location", "")],
            &[("co2", FieldValue::Integer(450))],
            1,
        );

        assert_eq!(
            to_line_protocol(&p).unwrap(),
            "aranet4_readings,device=aranet4 co2=450i 1"
        );
    }

    #[test]
    fn rejects_point_without_fields() {
        let p = point("aranet4_readings", &[("device", "aranet4")], &[], 1);
        assert!(matches!(
            to_line_protocol(&p),
            Err(IngestError::WriteRejected { .. })
        ));
    }

    #[test]
    fn rejects_non_finite_float() {
        let p = point("m", &[], &[("pressure", FieldValue::Float(f64::INFINITY))], 1);
        assert!(to_line_protocol(&p).is_err());
    }

    #[test]
    fn batch_is_newline_separated() {
        let mut fields = IndexMap::new();
        fields.insert("co2".to_string(), FieldValue::Integer(500));
        let a = Point {
            measurement: "aranet4_readings".to_string(),
            tags: IndexMap::new(),
            fields,
            timestamp: DateTime::<Utc>::from_timestamp(1, 0).unwrap(),
        };
        let mut b = a.clone();
        b.timestamp = DateTime::<Utc>::from_timestamp(2, 0).unwrap();

        assert_eq!(
            encode_batch(&[a, b]).unwrap(),
            "aranet4_readings co2=500i 1000000000\naranet4_readings co2=500i 2000000000"
        );
    }
}
