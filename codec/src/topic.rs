// Topic name / topic filter validation and the `+`/`#` matching rules.

use crate::error::DecodeError;

/// Validate a PUBLISH topic name: non-empty, no wildcard characters.
pub fn validate_topic_name(topic: &str) -> Result<(), DecodeError> {
    if topic.is_empty() || topic.contains(['+', '#']) {
        return Err(DecodeError::InvalidTopic);
    }
    Ok(())
}

/// Validate a SUBSCRIBE topic filter: `+` and `#` are only legal as whole
/// path segments, and `#` may only appear as the final segment.
pub fn validate_topic_filter(filter: &str) -> Result<(), DecodeError> {
    if filter.is_empty() {
        return Err(DecodeError::InvalidTopicFilter);
    }
    let segments: Vec<&str> = filter.split('/').collect();
    for (i, segment) in segments.iter().enumerate() {
        let is_last = i + 1 == segments.len();
        match *segment {
            "#" if !is_last => return Err(DecodeError::InvalidTopicFilter),
            s if s.contains('#') && s != "#" => return Err(DecodeError::InvalidTopicFilter),
            s if s.contains('+') && s != "+" => return Err(DecodeError::InvalidTopicFilter),
            _ => {}
        }
    }
    Ok(())
}

/// `ClientId` validity per MQTT-3.1.3-5: any UTF-8 string is accepted by
/// this broker (MQTT 5 lifts the MQTT 3.1 character-set restriction); only
/// emptiness is checked here, since an empty ClientID is handled specially
/// by the CONNECT decoder/broker rather than rejected at decode time.
#[must_use]
pub fn is_well_formed_client_id(client_id: &str) -> bool {
    client_id.len() <= 65535
}

/// True if `topic` (a concrete PUBLISH topic name) matches `filter` (a
/// SUBSCRIBE topic filter), per MQTT 5 §4.7 matching rules:
/// - `+` matches exactly one segment.
/// - `#` matches zero or more trailing segments.
/// - Topics beginning with `$` are excluded from a leading `#` or `+`.
#[must_use]
pub fn matches(filter: &str, topic: &str) -> bool {
    if (filter.starts_with('#') || filter.starts_with('+')) && topic.starts_with('$') {
        return false;
    }
    let mut f = filter.split('/');
    let mut t = topic.split('/');
    loop {
        match (f.next(), t.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(fs), Some(ts)) if fs == ts => continue,
            (Some(_), Some(_)) => return false,
            (None, None) => return true,
            (None, Some(_)) | (Some(_), None) => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plus_matches_one_segment() {
        assert!(matches("sport/+/score", "sport/tennis/score"));
        assert!(!matches("sport/+/score", "sport/tennis/player1"));
    }

    #[test]
    fn hash_matches_empty_suffix_and_more() {
        assert!(matches("sport/#", "sport"));
        assert!(matches("sport/#", "sport/tennis/score"));
    }

    #[test]
    fn dollar_topics_excluded_from_root_wildcards() {
        assert!(!matches("#", "$SYS/broker/uptime"));
        assert!(!matches("+/broker", "$SYS/broker"));
        assert!(matches("$SYS/#", "$SYS/broker/uptime"));
    }

    #[test]
    fn filter_validation_rejects_misplaced_wildcards() {
        assert!(validate_topic_filter("a/#/b").is_err());
        assert!(validate_topic_filter("a/b+").is_err());
        assert!(validate_topic_filter("a/+/#").is_ok());
    }
}
