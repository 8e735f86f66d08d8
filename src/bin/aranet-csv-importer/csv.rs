use std::io::Read;

use anyhow::{Context as _, Result, anyhow, bail};
use chrono::{DateTime, LocalResult, NaiveDateTime};
use chrono_tz::Tz;
use csv::{Reader, StringRecord, StringRecordsIntoIter};
use home_sensors::reading::{Quantity, RawReading, Unit};

const US_TIME_FORMAT: &str = "%m/%d/%Y %I:%M:%S %p";
const EU_TIME_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

#[derive(Debug, Clone, Copy)]
struct Column {
    index: usize,
    unit: Unit,
}

#[derive(Debug, Clone, Copy)]
struct Columns {
    time: usize,
    time_format: &'static str,
    co2: Column,
    temperature: Column,
    humidity: Column,
    pressure: Option<Column>,
}

#[derive(Debug)]
pub struct CsvRow {
    pub line: u64,
    pub measured_at: DateTime<Tz>,
    pub raw: RawReading,
}

/// Rows of an Aranet4 app history export, with columns located by header.
pub struct AranetCsvRows<R> {
    records: StringRecordsIntoIter<R>,
    columns: Columns,
    timezone: Tz,
}

impl<R: Read> AranetCsvRows<R> {
    pub fn new(reader: R, timezone: Tz) -> Result<Self> {
        let mut reader = Reader::from_reader(reader);
        let headers = reader.headers().context("failed to read CSV header")?.clone();
        let columns = detect_columns(&headers).context("unrecognized Aranet4 CSV header")?;

        Ok(Self {
            records: reader.into_records(),
            columns,
            timezone,
        })
    }
}

impl<R: Read> Iterator for AranetCsvRows<R> {
    type Item = Result<CsvRow>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = match self.records.next()? {
            Ok(row) => row,
            Err(e) => return Some(Err(e.into())),
        };

        Some(parse_row(&row, &self.columns, self.timezone))
    }
}

fn parse_row(row: &StringRecord, columns: &Columns, timezone: Tz) -> Result<CsvRow> {
    let line = row.position().map(|p| p.line()).unwrap_or_default();
    let cell = |index: usize| {
        row.get(index)
            .map(str::trim)
            .ok_or_else(|| anyhow!("line {line}: missing column {index}"))
    };

    let time = cell(columns.time)?;
    let naive = NaiveDateTime::parse_from_str(time, columns.time_format)
        .with_context(|| format!("line {line}: failed to parse timestamp: {time}"))?;
    let measured_at = match naive.and_local_timezone(timezone) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(dt, _) => dt,
        LocalResult::None => bail!("line {line}: invalid timestamp: {time}"),
    };

    let mut raw = RawReading::new();
    for (quantity, column) in [
        (Quantity::Co2, Some(columns.co2)),
        (Quantity::Temperature, Some(columns.temperature)),
        (Quantity::Humidity, Some(columns.humidity)),
        (Quantity::Pressure, columns.pressure),
    ] {
        let Some(column) = column else {
            continue;
        };

        let text = cell(column.index)?;
        let value: f64 = text.parse().with_context(|| {
            format!("line {line}: failed to parse {}: {text}", quantity.as_str())
        })?;
        raw.push(quantity, value, column.unit);
    }

    Ok(CsvRow {
        line,
        measured_at,
        raw,
    })
}

fn detect_columns(headers: &StringRecord) -> Result<Columns> {
    let find = |needle: &str| headers.iter().position(|h| h.contains(needle));

    let time = find("Time").ok_or_else(|| anyhow!("no Time column"))?;
    let time_format = if headers[time].contains("DD/MM/YYYY") {
        EU_TIME_FORMAT
    } else {
        US_TIME_FORMAT
    };

    let co2 = find("Carbon dioxide").ok_or_else(|| anyhow!("no Carbon dioxide column"))?;

    let temperature = find("Temperature").ok_or_else(|| anyhow!("no Temperature column"))?;
    let temperature_unit = if headers[temperature].contains("F)") {
        Unit::Fahrenheit
    } else if headers[temperature].contains("C)") {
        Unit::Celsius
    } else {
        bail!("unknown temperature unit: {}", &headers[temperature]);
    };

    let humidity = find("Relative humidity").ok_or_else(|| anyhow!("no Relative humidity column"))?;

    let pressure = match find("Atmospheric pressure") {
        Some(index) => Some(Column {
            index,
            unit: pressure_unit(&headers[index])?,
        }),
        None => None,
    };

    Ok(Columns {
        time,
        time_format,
        co2: Column {
            index: co2,
            unit: Unit::Ppm,
        },
        temperature: Column {
            index: temperature,
            unit: temperature_unit,
        },
        humidity: Column {
            index: humidity,
            unit: Unit::Percent,
        },
        pressure,
    })
}

fn pressure_unit(header: &str) -> Result<Unit> {
    for unit in [Unit::Atmosphere, Unit::HectoPascal, Unit::KiloPascal] {
        if header.contains(&format!("({})", unit.symbol())) {
            return Ok(unit);
        }
    }

    bail!("unknown pressure unit: {header}")
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone as _, Utc};

    use super::*;

    const US_EXPORT: &str = "\
Time(MM/DD/YYYY h:mm:ss A),Carbon dioxide(ppm),Temperature(°F),Relative humidity(%),Atmospheric pressure(atm)
06/09/2025 10:17:38 AM,612,73.4,41,0.9993
06/09/2025 10:22:38 AM,598,73.2,41,0.9994
";

    fn rows(csv: &str, timezone: Tz) -> Vec<Result<CsvRow>> {
        AranetCsvRows::new(csv.as_bytes(), timezone).unwrap().collect()
    }

    #[test]
    fn parses_us_export() {
        let rows = rows(US_EXPORT, chrono_tz::America::Los_Angeles);
        assert_eq!(rows.len(), 2);

        let first = rows[0].as_ref().unwrap();
        assert_eq!(
            first.measured_at.with_timezone(&Utc),
            Utc.with_ymd_and_hms(2025, 6, 9, 17, 17, 38).unwrap()
        );

        let temperature = first.raw.get(Quantity::Temperature).unwrap();
        assert_eq!(temperature.value, 73.4);
        assert_eq!(temperature.unit, Unit::Fahrenheit);

        let pressure = first.raw.get(Quantity::Pressure).unwrap();
        assert_eq!(pressure.unit, Unit::Atmosphere);
        assert!(first.raw.get(Quantity::Battery).is_none());
    }

    #[test]
    fn accepts_mis_decoded_degree_sign() {
        let csv = "Time(MM/DD/YYYY h:mm:ss A),Carbon dioxide(ppm),Temperature(Â°F),Relative humidity(%)\n\
                   06/09/2025 10:17:38 AM,612,73.4,41\n";
        let rows = rows(csv, chrono_tz::UTC);

        let first = rows[0].as_ref().unwrap();
        assert_eq!(first.raw.get(Quantity::Temperature).unwrap().unit, Unit::Fahrenheit);
        assert!(first.raw.get(Quantity::Pressure).is_none());
    }

    #[test]
    fn parses_celsius_hpa_export_with_day_first_dates() {
        let csv = "Time(DD/MM/YYYY H:mm:ss),Carbon dioxide(ppm),Temperature(°C),Relative humidity(%),Atmospheric pressure(hPa)\n\
                   09/06/2025 17:17:38,612,23.0,41,1012.6\n";
        let rows = rows(csv, chrono_tz::UTC);

        let first = rows[0].as_ref().unwrap();
        assert_eq!(
            first.measured_at.with_timezone(&Utc),
            Utc.with_ymd_and_hms(2025, 6, 9, 17, 17, 38).unwrap()
        );
        assert_eq!(first.raw.get(Quantity::Temperature).unwrap().unit, Unit::Celsius);
        assert_eq!(first.raw.get(Quantity::Pressure).unwrap().unit, Unit::HectoPascal);
    }

    #[test]
    fn bad_rows_are_reported_individually() {
        let csv = "Time(MM/DD/YYYY h:mm:ss A),Carbon dioxide(ppm),Temperature(°F),Relative humidity(%)\n\
                   not a date,612,73.4,41\n\
                   06/09/2025 10:22:38 AM,n/a,73.2,41\n\
                   06/09/2025 10:27:38 AM,605,73.1,40\n";
        let rows = rows(csv, chrono_tz::UTC);

        assert_eq!(rows.len(), 3);
        assert!(rows[0].is_err());
        assert!(rows[1].is_err());
        assert!(rows[2].is_ok());
    }

    #[test]
    fn rejects_foreign_header() {
        let csv = "Date,Temperature_Celsius(°C),Relative_Humidity(%)\n2025-06-09 10:17,23.0,41\n";
        assert!(AranetCsvRows::new(csv.as_bytes(), chrono_tz::UTC).is_err());
    }
}
