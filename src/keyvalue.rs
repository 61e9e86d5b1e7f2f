use std::collections::BTreeMap;

/// Parses a comma-delimited `key=value` list whose values may themselves
/// contain commas. A segment without `=` continues the previous value, so
/// `app.sftp.param=value1,value2` stays a single entry.
pub fn parse(raw: &str) -> BTreeMap<String, String> {
    parse_pairs(raw).into_iter().collect()
}

/// Same as [`parse`] but keeps first-occurrence order. A repeated key keeps
/// its original position and takes the later value.
pub fn parse_pairs(raw: &str) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::new();
    for segment in join_continuations(raw) {
        let Some((key, value)) = segment.split_once('=') else {
            continue;
        };
        let key = key.trim().to_string();
        let value = value.trim().to_string();
        match out.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => out.push((key, value)),
        }
    }
    out
}

fn join_continuations(raw: &str) -> Vec<String> {
    let mut pairs: Vec<String> = Vec::new();
    if raw.is_empty() {
        return pairs;
    }
    for (idx, candidate) in raw.split(',').enumerate() {
        match pairs.last_mut() {
            Some(last) if idx > 0 && !candidate.contains('=') => {
                last.push(',');
                last.push_str(candidate);
            }
            _ => pairs.push(candidate.to_string()),
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejoins_values_with_commas() {
        let parsed = parse("app.sftp.param=value1,value2,app.sftp.other.param=other1,other2");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed["app.sftp.param"], "value1,value2");
        assert_eq!(parsed["app.sftp.other.param"], "other1,other2");
    }

    #[test]
    fn leading_segment_without_equals_is_dropped() {
        let parsed = parse("garbage,count=3");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed["count"], "3");
    }

    #[test]
    fn continuation_of_a_dropped_segment_stays_dropped() {
        assert!(parse("a,b,c").is_empty());
    }

    #[test]
    fn only_first_equals_splits() {
        let parsed = parse(" url = jdbc:x?a=b ");
        assert_eq!(parsed["url"], "jdbc:x?a=b");
    }

    #[test]
    fn ordered_pairs_keep_position_and_last_value() {
        let pairs = parse_pairs("b=1,a=2,b=3");
        assert_eq!(
            pairs,
            vec![
                ("b".to_string(), "3".to_string()),
                ("a".to_string(), "2".to_string())
            ]
        );
    }

    #[test]
    fn empty_input_is_empty() {
        assert!(parse("").is_empty());
        assert!(parse_pairs("").is_empty());
    }
}
