//! CSV export of the lift max log.

use crate::{LiftMax, Result};
use std::io::Write;
use std::path::Path;

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow {
    id: String,
    user_id: String,
    lift_id: String,
    max_type: String,
    sequence: u64,
    value: f64,
    recorded_at: String,
}

impl From<&LiftMax> for CsvRow {
    fn from(record: &LiftMax) -> Self {
        CsvRow {
            id: record.id.to_string(),
            user_id: record.user_id.clone(),
            lift_id: record.lift_id.clone(),
            max_type: record.max_type.to_string(),
            sequence: record.sequence,
            value: record.value,
            recorded_at: record.recorded_at.to_rfc3339(),
        }
    }
}

/// Write max records as CSV, ordered by lift, max type and sequence
pub fn write_maxes<W: Write>(maxes: &[LiftMax], writer: W) -> Result<usize> {
    let mut sorted: Vec<&LiftMax> = maxes.iter().collect();
    sorted.sort_by(|a, b| {
        (&a.lift_id, a.max_type.to_string(), a.sequence)
            .cmp(&(&b.lift_id, b.max_type.to_string(), b.sequence))
    });

    let mut csv_writer = csv::Writer::from_writer(writer);
    for record in &sorted {
        csv_writer.serialize(CsvRow::from(*record))?;
    }
    csv_writer.flush()?;
    Ok(sorted.len())
}

/// Export max records to a CSV file, replacing any previous export
pub fn export_maxes(maxes: &[LiftMax], csv_path: &Path) -> Result<usize> {
    if let Some(parent) = csv_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file = std::fs::File::create(csv_path)?;
    let count = write_maxes(maxes, &file)?;
    file.sync_all()?;

    tracing::info!("Exported {} max records to {:?}", count, csv_path);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MaxType;
    use chrono::Utc;
    use uuid::Uuid;

    fn record(lift_id: &str, max_type: MaxType, sequence: u64, value: f64) -> LiftMax {
        LiftMax {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            lift_id: lift_id.into(),
            max_type,
            value,
            recorded_at: Utc::now(),
            sequence,
        }
    }

    #[test]
    fn test_export_writes_header_and_sorted_rows() {
        let temp_dir = tempfile::tempdir().unwrap();
        let csv_path = temp_dir.path().join("out").join("maxes.csv");

        let maxes = vec![
            record("squat", MaxType::TrainingMax, 2, 205.0),
            record("bench", MaxType::TrainingMax, 1, 150.0),
            record("squat", MaxType::TrainingMax, 1, 200.0),
        ];
        let count = export_maxes(&maxes, &csv_path).unwrap();
        assert_eq!(count, 3);

        let mut reader = csv::Reader::from_path(&csv_path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[2], "lift_id");

        let rows: Vec<(String, String, String)> = reader
            .records()
            .map(|r| {
                let r = r.unwrap();
                (r[2].to_string(), r[4].to_string(), r[5].to_string())
            })
            .collect();
        assert_eq!(
            rows,
            vec![
                ("bench".into(), "1".into(), "150.0".into()),
                ("squat".into(), "1".into(), "200.0".into()),
                ("squat".into(), "2".into(), "205.0".into()),
            ]
        );
    }

    #[test]
    fn test_empty_export_has_no_rows() {
        let mut buffer = Vec::new();
        let count = write_maxes(&[], &mut buffer).unwrap();
        assert_eq!(count, 0);
        assert!(buffer.is_empty());
    }
}
