//! On-disk layout of a per-executable duration record.
//!
//! A record lists the last observed duration of every test of one
//! executable. Two encodings are supported:
//!
//! | Format | Layout |
//! |--------|--------|
//! | `json` | `{"executable": "...", "updated_at": "...", "test_durations": [{"test": "...", "duration": 3}]}` |
//! | `xml`  | `<GtaTestDurations><Executable/><TestDurations><TestDuration Test="..." Duration="3"/></TestDurations></GtaTestDurations>` |
//!
//! The XML layout is the one written by earlier installations, so existing
//! sidecar files can be read and rewritten in place.

use std::collections::HashMap;
use std::path::PathBuf;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use serde::{Deserialize, Serialize};

/// Errors raised while encoding or decoding a record.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// The JSON document could not be parsed.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The XML document could not be parsed.
    #[error("invalid XML: {0}")]
    Xml(String),

    /// The record could not be serialized.
    #[error("failed to encode record: {0}")]
    Encode(String),
}

/// Serialization format of duration records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    /// Pretty-printed JSON.
    #[default]
    Json,

    /// XML compatible with `.gta.testdurations` files.
    Xml,
}

impl RecordFormat {
    /// Parses a record from its textual form.
    pub fn decode(&self, contents: &str) -> Result<DurationRecord, RecordError> {
        match self {
            RecordFormat::Json => Ok(serde_json::from_str(contents)?),
            RecordFormat::Xml => decode_xml(contents),
        }
    }

    /// Renders a record to its textual form.
    pub fn encode(&self, record: &DurationRecord) -> Result<String, RecordError> {
        match self {
            RecordFormat::Json => serde_json::to_string_pretty(record).map_err(encode),
            RecordFormat::Xml => encode_xml(record),
        }
    }
}

/// Last observed duration of one test, scoped to the record's executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDuration {
    /// Fully-qualified test name.
    pub test: String,

    /// Duration in milliseconds.
    pub duration: u64,
}

/// Duration history of a single test executable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationRecord {
    /// Canonical absolute path of the executable.
    pub executable: PathBuf,

    /// RFC 3339 timestamp of the last write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,

    /// One entry per test name.
    #[serde(default)]
    pub test_durations: Vec<TestDuration>,
}

impl DurationRecord {
    /// Creates an empty record for the given executable.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            updated_at: None,
            test_durations: Vec::new(),
        }
    }

    /// Returns the stored duration of a test, if any.
    pub fn get(&self, test: &str) -> Option<u64> {
        self.test_durations
            .iter()
            .rev()
            .find(|d| d.test == test)
            .map(|d| d.duration)
    }

    /// Returns all durations keyed by test name.
    ///
    /// If a hand-edited file lists a test twice, the later entry wins.
    pub fn durations(&self) -> HashMap<&str, u64> {
        self.test_durations
            .iter()
            .map(|d| (d.test.as_str(), d.duration))
            .collect()
    }

    /// Replaces or inserts durations, keeping each test name unique.
    ///
    /// Existing entries keep their position; new tests are appended.
    pub fn merge(&mut self, durations: impl IntoIterator<Item = (String, u64)>) {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut merged: Vec<TestDuration> = Vec::with_capacity(self.test_durations.len());
        for entry in self.test_durations.drain(..) {
            match index.get(&entry.test) {
                Some(&pos) => merged[pos].duration = entry.duration,
                None => {
                    index.insert(entry.test.clone(), merged.len());
                    merged.push(entry);
                }
            }
        }

        for (test, duration) in durations {
            match index.get(&test) {
                Some(&pos) => merged[pos].duration = duration,
                None => {
                    index.insert(test.clone(), merged.len());
                    merged.push(TestDuration { test, duration });
                }
            }
        }

        self.test_durations = merged;
    }

    /// Number of tests in the record.
    pub fn len(&self) -> usize {
        self.test_durations.len()
    }

    /// Returns true if the record holds no durations.
    pub fn is_empty(&self) -> bool {
        self.test_durations.is_empty()
    }
}

#[derive(Deserialize)]
#[serde(rename = "GtaTestDurations")]
struct XmlRecord {
    #[serde(rename = "Executable", default)]
    executable: String,

    #[serde(rename = "TestDurations", default)]
    test_durations: XmlTestDurations,
}

#[derive(Deserialize, Default)]
struct XmlTestDurations {
    #[serde(rename = "TestDuration", default)]
    entries: Vec<XmlTestDuration>,
}

#[derive(Deserialize)]
struct XmlTestDuration {
    #[serde(rename = "@Test")]
    test: String,

    #[serde(rename = "@Duration")]
    duration: u64,
}

fn decode_xml(contents: &str) -> Result<DurationRecord, RecordError> {
    let parsed: XmlRecord =
        quick_xml::de::from_str(contents).map_err(|e| RecordError::Xml(e.to_string()))?;

    Ok(DurationRecord {
        executable: PathBuf::from(parsed.executable),
        updated_at: None,
        test_durations: parsed
            .test_durations
            .entries
            .into_iter()
            .map(|e| TestDuration {
                test: e.test,
                duration: e.duration,
            })
            .collect(),
    })
}

fn encode(err: impl std::fmt::Display) -> RecordError {
    RecordError::Encode(err.to_string())
}

fn encode_xml(record: &DurationRecord) -> Result<String, RecordError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(encode)?;
    writer
        .write_event(Event::Start(BytesStart::new("GtaTestDurations")))
        .map_err(encode)?;

    let executable = record.executable.to_string_lossy();
    writer
        .write_event(Event::Start(BytesStart::new("Executable")))
        .map_err(encode)?;
    writer
        .write_event(Event::Text(BytesText::new(&executable)))
        .map_err(encode)?;
    writer
        .write_event(Event::End(BytesEnd::new("Executable")))
        .map_err(encode)?;

    if record.test_durations.is_empty() {
        writer
            .write_event(Event::Empty(BytesStart::new("TestDurations")))
            .map_err(encode)?;
    } else {
        writer
            .write_event(Event::Start(BytesStart::new("TestDurations")))
            .map_err(encode)?;
        for entry in &record.test_durations {
            let duration = entry.duration.to_string();
            let mut element = BytesStart::new("TestDuration");
            element.push_attribute(("Test", entry.test.as_str()));
            element.push_attribute(("Duration", duration.as_str()));
            writer.write_event(Event::Empty(element)).map_err(encode)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("TestDurations")))
            .map_err(encode)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("GtaTestDurations")))
        .map_err(encode)?;

    String::from_utf8(writer.into_inner()).map_err(encode)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DurationRecord {
        let mut record = DurationRecord::new("/build/tests.exe");
        record.merge([
            ("Suite.Fast".to_string(), 2),
            ("Suite.Slow<int>".to_string(), 1500),
        ]);
        record
    }

    #[test]
    fn test_merge_replaces_existing_entry() {
        let mut record = sample();
        record.merge([("Suite.Fast".to_string(), 7), ("Suite.New".to_string(), 1)]);

        assert_eq!(record.len(), 3);
        assert_eq!(record.get("Suite.Fast"), Some(7));
        assert_eq!(record.get("Suite.Slow<int>"), Some(1500));
        assert_eq!(record.test_durations[0].test, "Suite.Fast");
        assert_eq!(record.test_durations[2].test, "Suite.New");
    }

    #[test]
    fn test_merge_collapses_duplicates_on_disk() {
        let mut record = DurationRecord::new("/x");
        record.test_durations = vec![
            TestDuration {
                test: "A".to_string(),
                duration: 1,
            },
            TestDuration {
                test: "A".to_string(),
                duration: 4,
            },
        ];
        record.merge(std::iter::empty());

        assert_eq!(record.len(), 1);
        assert_eq!(record.get("A"), Some(4));
    }

    #[test]
    fn test_json_roundtrip() {
        let mut record = sample();
        record.updated_at = Some("2024-01-01T00:00:00+00:00".to_string());

        let text = RecordFormat::Json.encode(&record).unwrap();
        assert_eq!(RecordFormat::Json.decode(&text).unwrap(), record);
    }

    #[test]
    fn test_xml_escapes_and_roundtrips() {
        let record = sample();
        let text = RecordFormat::Xml.encode(&record).unwrap();

        assert!(text.contains("<GtaTestDurations>"));
        assert!(text.contains("Suite.Slow&lt;int&gt;"));
        assert_eq!(RecordFormat::Xml.decode(&text).unwrap(), record);
    }

    #[test]
    fn test_xml_reads_legacy_file() {
        let legacy = r#"<?xml version="1.0" encoding="utf-8"?>
<GtaTestDurations xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:xsd="http://www.w3.org/2001/XMLSchema">
  <Executable>C:\build\Tests.exe</Executable>
  <TestDurations>
    <TestDuration Test="TestSuite1.Test1" Duration="3" />
    <TestDuration Test="TestSuite1.Test2" Duration="12" />
  </TestDurations>
</GtaTestDurations>"#;

        let record = RecordFormat::Xml.decode(legacy).unwrap();
        assert_eq!(record.executable, PathBuf::from(r"C:\build\Tests.exe"));
        assert_eq!(record.get("TestSuite1.Test1"), Some(3));
        assert_eq!(record.get("TestSuite1.Test2"), Some(12));
    }

    #[test]
    fn test_xml_empty_record() {
        let record = DurationRecord::new("/x");
        let text = RecordFormat::Xml.encode(&record).unwrap();
        let decoded = RecordFormat::Xml.decode(&text).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(RecordFormat::Json.decode("{ not json").is_err());
        assert!(RecordFormat::Xml.decode("<GtaTestDurations><TestDurations>").is_err());
    }
}
