//! Cheap criteria checks applied before any matcher is invoked.

/// True when the criteria is empty or whitespace.
pub fn is_blank(criteria: &str) -> bool {
    criteria.trim().is_empty()
}

/// Resource type a criteria string targets: the text before `?`, trimmed.
///
/// `Observation?code=1234-5` targets `Observation`; a criteria without `?`
/// is a bare resource type.
pub fn criteria_resource_type(criteria: &str) -> &str {
    criteria
        .split_once('?')
        .map_or(criteria, |(resource_type, _)| resource_type)
        .trim()
}

/// Query part after `?`, empty when there is none.
pub fn criteria_query(criteria: &str) -> &str {
    criteria.split_once('?').map_or("", |(_, query)| query.trim())
}

/// Whether a subscription with `criteria` could match a `resource_type` event.
///
/// Never rejects a criteria that a full matcher would accept.
pub fn passes_prefilter(criteria: &str, resource_type: &str) -> bool {
    criteria_resource_type(criteria) == resource_type
}
