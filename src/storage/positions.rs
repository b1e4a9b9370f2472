//! Position records of the `<name>_meta.bin` file.
//!
//! One JSON object per line, in insert order. A tombstone is a record whose
//! offsets are both `-1`.

use std::collections::HashMap;
use std::io::BufRead;

use serde::{Deserialize, Serialize};

use crate::storage::error::{StorageError, StorageResult};

/// Offset value marking a deleted vector.
pub const TOMBSTONE: i64 = -1;

/// Where one vector's coordinates and payload live in the data file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionRecord {
    #[serde(rename = "VectorID")]
    pub vector_id: String,

    #[serde(rename = "DataStart")]
    pub data_start: i64,

    #[serde(rename = "PayloadStart")]
    pub payload_start: i64,
}

impl PositionRecord {
    pub fn new(vector_id: impl Into<String>, data_start: i64, payload_start: i64) -> Self {
        Self {
            vector_id: vector_id.into(),
            data_start,
            payload_start,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.data_start < 0
    }

    /// Serializes the record as a single newline-terminated line.
    pub fn to_line(&self) -> StorageResult<String> {
        let mut line = serde_json::to_string(self).map_err(|e| StorageError::PositionDecode {
            line: 0,
            reason: e.to_string(),
        })?;
        line.push('\n');
        Ok(line)
    }
}

/// Decodes every record from a metadata file reader, in file order.
///
/// Blank lines are skipped so a file padded by an interrupted rewrite still
/// loads.
pub fn decode_records(reader: impl BufRead) -> StorageResult<Vec<PositionRecord>> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.map_err(|e| StorageError::PositionDecode {
            line: line_no,
            reason: e.to_string(),
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let record = serde_json::from_str(trimmed).map_err(|e| StorageError::PositionDecode {
            line: line_no,
            reason: e.to_string(),
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Collapses an append-ordered record list into the live set.
///
/// A later record for the same id supersedes an earlier one, and tombstones
/// drop the id. Each surviving record comes with its ordinal in the file.
/// The result keeps first-seen order.
pub fn live_records(records: Vec<PositionRecord>) -> Vec<(u64, PositionRecord)> {
    let mut order: Vec<String> = Vec::new();
    let mut latest: HashMap<String, (u64, PositionRecord)> = HashMap::new();

    for (ordinal, record) in records.into_iter().enumerate() {
        if !latest.contains_key(&record.vector_id) {
            order.push(record.vector_id.clone());
        }
        latest.insert(record.vector_id.clone(), (ordinal as u64, record));
    }

    order
        .into_iter()
        .filter_map(|id| latest.remove(&id))
        .filter(|(_, record)| !record.is_tombstone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_line_format_matches_meta_file() {
        let line = PositionRecord::new("abc", 16, 32).to_line().unwrap();
        assert_eq!(
            line,
            "{\"VectorID\":\"abc\",\"DataStart\":16,\"PayloadStart\":32}\n"
        );
    }

    #[test]
    fn test_decode_skips_blank_lines() {
        let text = "{\"VectorID\":\"a\",\"DataStart\":0,\"PayloadStart\":8}\n\n   \n\
                    {\"VectorID\":\"b\",\"DataStart\":-1,\"PayloadStart\":-1}\n";
        let records = decode_records(Cursor::new(text)).unwrap();
        assert_eq!(records.len(), 2);
        assert!(!records[0].is_tombstone());
        assert!(records[1].is_tombstone());
    }

    #[test]
    fn test_decode_reports_line_number() {
        let text = "{\"VectorID\":\"a\",\"DataStart\":0,\"PayloadStart\":8}\nnot json\n";
        let err = decode_records(Cursor::new(text)).unwrap_err();
        assert!(matches!(err, StorageError::PositionDecode { line: 2, .. }));
    }

    #[test]
    fn test_live_records_last_write_wins() {
        let records = vec![
            PositionRecord::new("a", 0, 8),
            PositionRecord::new("b", 20, 28),
            PositionRecord::new("a", TOMBSTONE, TOMBSTONE),
            PositionRecord::new("c", 40, 48),
            PositionRecord::new("a", 60, 68),
            PositionRecord::new("c", TOMBSTONE, TOMBSTONE),
        ];
        let live = live_records(records);
        let ids: Vec<_> = live.iter().map(|(_, r)| r.vector_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(live[0], (4, PositionRecord::new("a", 60, 68)));
        assert_eq!(live[1].0, 1);
    }
}
