use std::io;

use serde::Serialize;
use tmoss_core::MatchRecord;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JsonTopMatch {
    pub(crate) student: String,
    pub(crate) other: Option<String>,
    pub(crate) snapshot: String,
    pub(crate) score: f64,
}

impl From<MatchRecord> for JsonTopMatch {
    fn from(record: MatchRecord) -> Self {
        Self {
            student: record.student,
            other: record.other,
            snapshot: record.snapshot,
            score: record.score,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JsonCourse {
    pub(crate) course: String,
    pub(crate) top_matches: Vec<JsonTopMatch>,
}

impl JsonCourse {
    pub(crate) fn new(course: &str, records: Vec<MatchRecord>) -> Self {
        Self {
            course: course.to_string(),
            top_matches: records.into_iter().map(JsonTopMatch::from).collect(),
        }
    }
}

pub(crate) fn write_json<T: Serialize>(value: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| io::Error::other(format!("json encode: {e}")))?;
    println!("{json}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn courses_serialize_with_camel_case_keys() {
        let course = JsonCourse::new(
            "cs",
            vec![MatchRecord {
                student: "alice".to_string(),
                other: None,
                snapshot: "alice_100_aaa".to_string(),
                score: 0.0,
            }],
        );
        let value = serde_json::to_value(&course).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "course": "cs",
                "topMatches": [
                    {"student": "alice", "other": null, "snapshot": "alice_100_aaa", "score": 0.0}
                ]
            })
        );
    }
}
