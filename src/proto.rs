//! Analyzer wire types
//!
//! Shapes of the JSON the SECBIT compiler emits. The native binary writes a report file
//! keyed by `secbit-warnings`; the embedded build returns a compiler output object keyed by
//! `errors`. Both carry the same finding records.
//!
//! Positions arrive 1-based and sometimes as strings rather than numbers, so coordinates go
//! through a lenient deserializer. They are kept signed so that out-of-contract values
//! reach the normalizer unchanged.

use serde::{de, Deserialize, Deserializer, Serialize};

pub const EXTERNAL_REPORT_KEY: &str = "secbit-warnings";

pub const IN_PROCESS_OUTPUT_KEY: &str = "errors";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFinding {
    pub tag: String,

    #[serde(rename = "desc", alias = "description")]
    pub description: String,

    #[serde(
        rename = "startline",
        alias = "startLine",
        deserialize_with = "deserialize_coordinate"
    )]
    pub start_line: i64,

    #[serde(
        rename = "startcolumn",
        alias = "startColumn",
        deserialize_with = "deserialize_coordinate"
    )]
    pub start_column: i64,

    #[serde(
        rename = "endline",
        alias = "endLine",
        deserialize_with = "deserialize_coordinate"
    )]
    pub end_line: i64,

    #[serde(
        rename = "endcolumn",
        alias = "endColumn",
        deserialize_with = "deserialize_coordinate"
    )]
    pub end_column: i64,
}

/// Report file written by the native compiler through `--secbit-warnings`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalReport {
    #[serde(rename = "secbit-warnings")]
    pub warnings: Vec<RawFinding>,
}

/// Result of the embedded `compileJSON` entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileOutput {
    pub errors: Vec<RawFinding>,
}

pub fn parse_external_report(payload: &str) -> Result<Vec<RawFinding>, serde_json::Error> {
    serde_json::from_str::<ExternalReport>(payload).map(|report| report.warnings)
}

pub fn parse_compile_output(payload: &str) -> Result<Vec<RawFinding>, serde_json::Error> {
    serde_json::from_str::<CompileOutput>(payload).map(|output| output.errors)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Coordinate {
    Number(i64),
    Text(String),
}

fn deserialize_coordinate<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Coordinate::deserialize(deserializer)? {
        Coordinate::Number(value) => Ok(value),
        Coordinate::Text(text) => text.trim().parse::<i64>().map_err(|_| {
            de::Error::invalid_value(de::Unexpected::Str(&text), &"an integer position")
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_external_report() {
        let payload = json!({
            "secbit-warnings": [
                {
                    "tag": "reentrance",
                    "desc": "possible reentrancy",
                    "startline": 10,
                    "startcolumn": 5,
                    "endline": 10,
                    "endcolumn": 20
                }
            ]
        })
        .to_string();

        let findings = parse_external_report(&payload).unwrap();

        assert_eq!(
            findings,
            vec![RawFinding {
                tag: "reentrance".to_string(),
                description: "possible reentrancy".to_string(),
                start_line: 10,
                start_column: 5,
                end_line: 10,
                end_column: 20,
            }]
        );
    }

    #[test]
    fn test_parse_string_coordinates() {
        let payload = json!({
            "errors": [
                {
                    "tag": "tx-origin",
                    "desc": "tx.origin used for authorization",
                    "startline": "3",
                    "startcolumn": " 9",
                    "endline": "3",
                    "endcolumn": "18"
                }
            ]
        })
        .to_string();

        let findings = parse_compile_output(&payload).unwrap();

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].start_line, 3);
        assert_eq!(findings[0].start_column, 9);
        assert_eq!(findings[0].end_column, 18);
    }

    #[test]
    fn test_parse_camel_case_aliases() {
        let payload = json!({
            "secbit-warnings": [
                {
                    "tag": "throw",
                    "description": "use revert()",
                    "startLine": 1,
                    "startColumn": 1,
                    "endLine": 1,
                    "endColumn": 6
                }
            ]
        })
        .to_string();

        let findings = parse_external_report(&payload).unwrap();
        assert_eq!(findings[0].description, "use revert()");
        assert_eq!(findings[0].end_column, 6);
    }

    #[test]
    fn test_zero_coordinates_pass_through() {
        let payload = json!({
            "errors": [
                {
                    "tag": "sha3",
                    "desc": "",
                    "startline": 0,
                    "startcolumn": -2,
                    "endline": 0,
                    "endcolumn": 0
                }
            ]
        })
        .to_string();

        let findings = parse_compile_output(&payload).unwrap();
        assert_eq!(findings[0].start_line, 0);
        assert_eq!(findings[0].start_column, -2);
    }

    #[test]
    fn test_empty_findings_list() {
        let findings = parse_external_report(r#"{"secbit-warnings": []}"#).unwrap();
        assert!(findings.is_empty());
    }

    #[test]
    fn test_malformed_payloads_rejected() {
        assert!(parse_external_report(r#"{"secbit-warnings": [{"tag": "x""#).is_err());
        assert!(parse_external_report(r#"{"errors": []}"#).is_err());
        assert!(parse_compile_output("not json").is_err());
        assert!(parse_compile_output(
            r#"{"errors": [{"tag": "x", "desc": "", "startline": "ten",
                "startcolumn": 1, "endline": 1, "endcolumn": 1}]}"#
        )
        .is_err());
    }
}
