//! Parsing and validation of roboface.sensor_event.v1 traces

use crate::config::FilterConfig;
use crate::error::EngineError;
use crate::schema::sensor_event::*;
use crate::types::{Millis, SensorEvent};

/// Reads sensor traces in array or NDJSON form
pub struct SensorTraceAdapter;

impl SensorTraceAdapter {
    /// Parse a JSON string containing an array of SensorRecords
    pub fn parse_array(json: &str) -> Result<Vec<SensorRecord>, EngineError> {
        let records: Vec<SensorRecord> = serde_json::from_str(json)?;
        Ok(records)
    }

    /// Parse NDJSON (newline-delimited JSON) containing SensorRecords
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<SensorRecord>, EngineError> {
        let mut records = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            if let Some(record) = Self::parse_line(line, line_num + 1)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Parse a single NDJSON line; blank lines and `#` comments yield `None`
    pub fn parse_line(line: &str, line_num: usize) -> Result<Option<SensorRecord>, EngineError> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(None);
        }
        serde_json::from_str::<SensorRecord>(trimmed)
            .map(Some)
            .map_err(|e| {
                EngineError::ParseError(format!("Failed to parse line {}: {}", line_num, e))
            })
    }

    /// Parse either form, deciding by the first non-blank character
    pub fn parse_auto(input: &str) -> Result<Vec<SensorRecord>, EngineError> {
        if input.trim_start().starts_with('[') {
            Self::parse_array(input)
        } else {
            Self::parse_ndjson(input)
        }
    }

    /// Timestamped engine inputs, in trace order
    pub fn to_events(records: &[SensorRecord]) -> Vec<(Millis, SensorEvent)> {
        records.iter().map(|r| (r.t_ms, r.to_event())).collect()
    }

    /// Validate a batch of records against the default limits
    pub fn validate_trace(records: &[SensorRecord]) -> Vec<ValidationResult> {
        Self::validate_trace_with(records, &FilterConfig::default())
    }

    /// Validate a batch of records, including timestamp order
    pub fn validate_trace_with(
        records: &[SensorRecord],
        limits: &FilterConfig,
    ) -> Vec<ValidationResult> {
        let mut results = Vec::new();
        let mut previous: Option<Millis> = None;

        for (index, record) in records.iter().enumerate() {
            if let Err(error) = record.validate_with(limits) {
                results.push(ValidationResult {
                    index,
                    t_ms: record.t_ms,
                    kind: record.kind(),
                    error,
                });
            }
            if let Some(prev) = previous {
                if record.t_ms < prev {
                    results.push(ValidationResult {
                        index,
                        t_ms: record.t_ms,
                        kind: record.kind(),
                        error: ValidationError::UnorderedTimestamp {
                            previous: prev,
                            current: record.t_ms,
                        },
                    });
                }
            }
            previous = Some(previous.map_or(record.t_ms, |p| p.max(record.t_ms)));
        }

        results
    }
}

/// A problem found in one record
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub index: usize,
    pub t_ms: Millis,
    pub kind: &'static str,
    pub error: ValidationError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TRACE: &str = r#"{"t_ms":0,"kind":"motion","x":0.0,"y":0.0,"z":9.81}

# covered by a hand
{"t_ms":100,"kind":"proximity","distance":0.0,"max_range":5.0}
{"t_ms":200,"kind":"sound","mean_abs_amplitude":120.0}
"#;

    #[test]
    fn test_parse_ndjson() {
        let records = SensorTraceAdapter::parse_ndjson(TRACE).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].kind(), "proximity");
        assert_eq!(records[2].t_ms, 200);
    }

    #[test]
    fn test_parse_ndjson_reports_line() {
        let ndjson = "{\"t_ms\":0,\"kind\":\"rotation\",\"z\":0.1}\n{\"t_ms\":1,\"kind\":\"nope\"}\n";
        match SensorTraceAdapter::parse_ndjson(ndjson) {
            Err(EngineError::ParseError(message)) => assert!(message.contains("line 2")),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_array_and_auto() {
        let json = r#"[{"t_ms":0,"kind":"rotation","z":0.5},{"t_ms":10,"kind":"pcm","samples":[1,2]}]"#;
        let records = SensorTraceAdapter::parse_array(json).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(SensorTraceAdapter::parse_auto(json).unwrap(), records);
        assert_eq!(SensorTraceAdapter::parse_auto(TRACE).unwrap().len(), 3);
    }

    #[test]
    fn test_to_events() {
        let records = SensorTraceAdapter::parse_ndjson(TRACE).unwrap();
        let events = SensorTraceAdapter::to_events(&records);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].0, 0);
        assert_eq!(events[0].1.kind(), "motion");
    }

    #[test]
    fn test_validate_trace_clean() {
        let records = SensorTraceAdapter::parse_ndjson(TRACE).unwrap();
        assert!(SensorTraceAdapter::validate_trace(&records).is_empty());
    }

    #[test]
    fn test_validate_trace_reports_problems() {
        let records = vec![
            SensorRecord::new(100, SensorPayload::Rotation { z: 0.0 }),
            SensorRecord::new(50, SensorPayload::Rotation { z: 0.0 }),
            SensorRecord::new(
                150,
                SensorPayload::Sound {
                    mean_abs_amplitude: 40_000.0,
                },
            ),
        ];
        let results = SensorTraceAdapter::validate_trace(&records);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].index, 1);
        assert_eq!(
            results[0].error,
            ValidationError::UnorderedTimestamp {
                previous: 100,
                current: 50
            }
        );
        assert_eq!(results[1].index, 2);
        assert_eq!(results[1].kind, "sound");
    }
}
