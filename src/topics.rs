//! Topic filter matching and validation
//!
//! Topics are `/`-delimited. Subscription filters may use `+` for exactly one
//! level and `#` for all remaining levels (zero or more); `#` is only legal as
//! the final level. Publish topics never contain wildcards.

use crate::error::{CommError, CommResult};

pub const SINGLE_LEVEL_WILDCARD: &str = "+";
pub const MULTI_LEVEL_WILDCARD: &str = "#";

/// Decide whether a concrete `topic` matches the subscription `filter`
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            // '#' swallows the rest, but only when it is the last filter level
            (Some(MULTI_LEVEL_WILDCARD), _) => return filter_levels.next().is_none(),
            (Some(SINGLE_LEVEL_WILDCARD), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// True if the filter contains a wildcard level
pub fn has_wildcards(filter: &str) -> bool {
    filter
        .split('/')
        .any(|level| level == SINGLE_LEVEL_WILDCARD || level == MULTI_LEVEL_WILDCARD)
}

/// Validate a subscription filter
pub fn validate_filter(filter: &str) -> CommResult<()> {
    if filter.is_empty() {
        return Err(CommError::invalid_topic(filter, "filter must not be empty"));
    }

    let levels: Vec<&str> = filter.split('/').collect();
    let last = levels.len() - 1;
    for (index, level) in levels.iter().enumerate() {
        if level.contains('#') && (*level != MULTI_LEVEL_WILDCARD || index != last) {
            return Err(CommError::invalid_topic(
                filter,
                "'#' must occupy the whole final level",
            ));
        }
        if level.contains('+') && *level != SINGLE_LEVEL_WILDCARD {
            return Err(CommError::invalid_topic(
                filter,
                "'+' must occupy a whole level",
            ));
        }
    }

    Ok(())
}

/// Validate a publish topic
pub fn validate_topic(topic: &str) -> CommResult<()> {
    if topic.is_empty() {
        return Err(CommError::invalid_topic(topic, "topic must not be empty"));
    }
    if topic.contains(|c| c == '+' || c == '#') {
        return Err(CommError::invalid_topic(
            topic,
            "wildcards are not allowed when publishing",
        ));
    }
    Ok(())
}
