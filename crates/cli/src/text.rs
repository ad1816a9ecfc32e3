use tmoss_core::MatchRecord;

pub(crate) fn format_text(course: &str, records: &[MatchRecord]) -> String {
    let mut out = String::new();
    out.push_str(&format!("== {course} ==\n"));
    out.push_str(&format!("top matches: {}\n", records.len()));

    for record in records {
        out.push_str(&format!(
            "{} -> {} snapshot={} score={}\n",
            record.student,
            record.other.as_deref().unwrap_or("-"),
            record.snapshot,
            record.score
        ));
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_show_a_dash() {
        let records = vec![
            MatchRecord {
                student: "alice".to_string(),
                other: Some("bob".to_string()),
                snapshot: "alice_200_bbb".to_string(),
                score: 40.0,
            },
            MatchRecord::placeholder("carol", "carol_100_ccc"),
        ];
        assert_eq!(
            format_text("cs", &records),
            "== cs ==\ntop matches: 2\n\
             alice -> bob snapshot=alice_200_bbb score=40\n\
             carol -> - snapshot=carol_100_ccc score=0\n\n"
        );
    }
}
