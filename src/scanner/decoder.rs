//! Decoder invocation and output line decoding.

use crate::config::DecoderConfig;
use crate::error::DecodeError;
use crate::models::{EventRecord, Frequency};
use serde_json::Value;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Message type used when a record carries none.
pub const UNKNOWN_TYPE: &str = "UNKNOWN";

/// Substrings (lowercase) that mark a decoder stderr line as worth showing.
const DIAGNOSTIC_KEYWORDS: &[&str] = &[
    "error",
    "failed",
    "panic",
    "fatal",
    "invalid",
    "could not",
    "overflow",
    "timeout",
    "unavailable",
];

/// Everything needed to launch the decoder, apart from frequency and dwell.
#[derive(Debug, Clone)]
pub struct DecoderSettings {
    pub program: String,
    pub server: String,
    pub sample_rate: u32,
    /// `-msgtype` selector: `all` or a comma list.
    pub msgtype: String,
}

impl DecoderSettings {
    pub fn new(config: &DecoderConfig, msgtype: &str) -> Self {
        Self {
            program: config.path.clone(),
            server: config.server.clone(),
            sample_rate: config.sample_rate,
            msgtype: msgtype.to_string(),
        }
    }

    /// Arguments for one dwell.
    pub fn args(&self, center: Frequency, seconds: u64) -> Vec<String> {
        vec![
            format!("-server={}", self.server),
            format!("-samplerate={}", self.sample_rate),
            format!("-centerfreq={}", center.hz()),
            format!("-msgtype={}", self.msgtype),
            "-format=json".to_string(),
            "-unique=false".to_string(),
            format!("-duration={}s", seconds),
        ]
    }

    /// Process builder for one dwell: stdin closed, stdout and stderr piped,
    /// killed if the handle is dropped.
    pub fn command(&self, center: Frequency, seconds: u64) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args(center, seconds))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Full command line, for logs.
    pub fn command_line(&self, center: Frequency, seconds: u64) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args(center, seconds));
        parts.join(" ")
    }

    /// Program name without directories, for suggested commands.
    pub fn display_name(&self) -> String {
        decoder_display_name(&self.program)
    }
}

/// File name of a decoder path such as `/opt/bin/rtlamr`.
pub fn decoder_display_name(program: &str) -> String {
    Path::new(program)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.to_string())
}

/// Decode one JSON line emitted while tuned to `frequency`.
///
/// The type comes from `Type` (default `UNKNOWN`, uppercased, inner
/// whitespace joined with `_`). The radio id
/// comes from `Message.ID`, or a top-level `ID` when there is no `Message`
/// object. Integer and integer-string ids are accepted.
pub fn decode_line(line: &str, frequency: Frequency) -> Result<EventRecord, DecodeError> {
    let value: Value = serde_json::from_str(line)?;

    let message_type = match value.get("Type") {
        None | Some(Value::Null) => UNKNOWN_TYPE.to_string(),
        Some(Value::String(s)) => normalize_type(s),
        Some(other) => normalize_type(&other.to_string()),
    };

    let meter = match value.get("Message") {
        Some(message) if message.is_object() => message,
        _ => &value,
    };

    let radio_id = match meter.get("ID") {
        None | Some(Value::Null) => return Err(DecodeError::MissingId),
        Some(id) => parse_radio_id(id)?,
    };

    Ok(EventRecord {
        radio_id,
        message_type,
        frequency,
    })
}

/// Uppercase a message type and make it a single report column token.
fn normalize_type(raw: &str) -> String {
    let token = raw.split_whitespace().collect::<Vec<_>>().join("_");
    if token.is_empty() {
        UNKNOWN_TYPE.to_string()
    } else {
        token.to_uppercase()
    }
}

fn parse_radio_id(id: &Value) -> Result<u64, DecodeError> {
    match id {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| DecodeError::InvalidId(n.to_string())),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| DecodeError::InvalidId(s.clone())),
        other => Err(DecodeError::InvalidId(other.to_string())),
    }
}

/// Whether a stderr line looks like a real problem rather than startup noise.
pub fn is_diagnostic_error(line: &str) -> bool {
    let lower = line.to_lowercase();
    DIAGNOSTIC_KEYWORDS.iter().any(|k| lower.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn freq() -> Frequency {
        Frequency::from_mhz(911.5).unwrap()
    }

    fn settings() -> DecoderSettings {
        DecoderSettings {
            program: "/opt/rtlamr/bin/rtlamr".to_string(),
            server: "10.0.0.5:1234".to_string(),
            sample_rate: 2_359_296,
            msgtype: "scm,idm".to_string(),
        }
    }

    #[test]
    fn test_args() {
        let args = settings().args(Frequency::from_mhz(912.38).unwrap(), 30);
        assert_eq!(
            args,
            vec![
                "-server=10.0.0.5:1234",
                "-samplerate=2359296",
                "-centerfreq=912380000",
                "-msgtype=scm,idm",
                "-format=json",
                "-unique=false",
                "-duration=30s",
            ]
        );
    }

    #[test]
    fn test_command_line_and_display_name() {
        let s = settings();
        assert!(s
            .command_line(freq(), 5)
            .starts_with("/opt/rtlamr/bin/rtlamr -server=10.0.0.5:1234"));
        assert_eq!(s.display_name(), "rtlamr");
        assert_eq!(decoder_display_name("rtlamr"), "rtlamr");
    }

    #[test]
    fn test_decode_nested_message() {
        let line = r#"{"Time":"2024-01-01T00:00:00Z","Type":"scm","Message":{"ID":12345678,"Type":7,"Consumption":100}}"#;
        let rec = decode_line(line, freq()).unwrap();
        assert_eq!(rec.radio_id, 12345678);
        assert_eq!(rec.message_type, "SCM");
        assert_eq!(rec.frequency, freq());
    }

    #[test]
    fn test_decode_top_level_and_string_id() {
        let rec = decode_line(r#"{"Type":"R900","ID":"1571038152"}"#, freq()).unwrap();
        assert_eq!(rec.radio_id, 1571038152);
        assert_eq!(rec.message_type, "R900");

        let rec = decode_line(r#"{"ID":42}"#, freq()).unwrap();
        assert_eq!(rec.message_type, UNKNOWN_TYPE);
    }

    #[test]
    fn test_decode_type_is_one_token() {
        let rec = decode_line(r#"{"Type":"","ID":5}"#, freq()).unwrap();
        assert_eq!(rec.message_type, UNKNOWN_TYPE);

        let rec = decode_line(r#"{"Type":"   ","ID":5}"#, freq()).unwrap();
        assert_eq!(rec.message_type, UNKNOWN_TYPE);

        let rec = decode_line(r#"{"Type":" scm  plus\t","ID":6}"#, freq()).unwrap();
        assert_eq!(rec.message_type, "SCM_PLUS");
    }

    #[test]
    fn test_decode_failures() {
        assert!(matches!(
            decode_line("not json", freq()),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            decode_line(r#"{"Type":"SCM","Message":{"Consumption":1}}"#, freq()),
            Err(DecodeError::MissingId)
        ));
        assert!(matches!(
            decode_line(r#"{"Type":"SCM","Message":{"ID":null}}"#, freq()),
            Err(DecodeError::MissingId)
        ));
        assert!(matches!(
            decode_line(r#"{"Type":"SCM","ID":"abc"}"#, freq()),
            Err(DecodeError::InvalidId(_))
        ));
        assert!(matches!(
            decode_line(r#"{"Type":"SCM","ID":-4}"#, freq()),
            Err(DecodeError::InvalidId(_))
        ));
        assert!(matches!(
            decode_line(r#"{"ID":[1]}"#, freq()),
            Err(DecodeError::InvalidId(_))
        ));
    }

    #[test]
    fn test_is_diagnostic_error() {
        assert!(is_diagnostic_error("dial tcp 127.0.0.1:1234: connection Timeout"));
        assert!(is_diagnostic_error("PANIC: runtime error"));
        assert!(is_diagnostic_error("could not connect"));
        assert!(!is_diagnostic_error("decode.go:45: CenterFreq: 911500000"));
        assert!(!is_diagnostic_error("GainCount: 29"));
    }
}
