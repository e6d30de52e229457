//! Criteria matchers.

use async_trait::async_trait;
use serde_json::Value;

use octofhir_core::{ChangeEvent, param_values};

use crate::criteria::{criteria_query, criteria_resource_type};
use crate::error::{SubscriptionError, SubscriptionResult};
use crate::types::MatchResult;

/// Evaluates a subscription criteria against a change event.
///
/// Called concurrently for many subscriptions; implementations hold no
/// per-call state.
#[async_trait]
pub trait SubscriptionMatcher: Send + Sync {
    /// Matcher name reported in [`MatchResult::matcher_name`].
    fn name(&self) -> &str;

    async fn matches(&self, criteria: &str, event: &ChangeEvent) -> SubscriptionResult<MatchResult>;
}

/// Evaluates `Type?param=value&...` against the event payload in memory.
///
/// Parameters are ANDed, comma-separated values are ORed. Supported
/// modifiers: `:not`, `:missing`. Chained and reverse-chained parameters are
/// rejected as unsupported.
#[derive(Debug, Default, Clone, Copy)]
pub struct InMemoryMatcher;

const MATCHER_NAME: &str = "in-memory";

impl InMemoryMatcher {
    pub fn new() -> Self {
        Self
    }

    fn evaluate(criteria: &str, resource: &Value) -> SubscriptionResult<bool> {
        for clause in criteria_query(criteria).split('&').filter(|c| !c.is_empty()) {
            let (name, expected) = clause.split_once('=').unwrap_or((clause, ""));
            let (param, modifier) = match name.split_once(':') {
                Some((param, modifier)) => (param, Some(modifier)),
                None => (name, None),
            };

            if param.contains('.') || param.starts_with("_has") {
                return Err(SubscriptionError::unsupported_criteria(
                    criteria,
                    format!("chained parameter '{param}'"),
                ));
            }
            if param == "_count" || param == "_sort" {
                continue;
            }

            let actual = param_values(resource, param);
            let wanted: Vec<&str> = expected.split(',').filter(|v| !v.is_empty()).collect();
            let any_equal = || wanted.iter().any(|w| actual.iter().any(|a| a == w));

            let clause_ok = match modifier {
                None => any_equal(),
                Some("not") => !any_equal(),
                Some("missing") => match expected {
                    "true" => actual.is_empty(),
                    "false" => !actual.is_empty(),
                    other => {
                        return Err(SubscriptionError::unsupported_criteria(
                            criteria,
                            format!(":missing expects true or false, got '{other}'"),
                        ));
                    }
                },
                Some(other) => {
                    return Err(SubscriptionError::unsupported_criteria(
                        criteria,
                        format!("modifier ':{other}'"),
                    ));
                }
            };
            if !clause_ok {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl SubscriptionMatcher for InMemoryMatcher {
    fn name(&self) -> &str {
        MATCHER_NAME
    }

    async fn matches(&self, criteria: &str, event: &ChangeEvent) -> SubscriptionResult<MatchResult> {
        if criteria_resource_type(criteria) != event.resource_type {
            return Ok(MatchResult::no_match(MATCHER_NAME));
        }
        let resource = event.new_payload()?;
        let matched = Self::evaluate(criteria, resource)?;
        Ok(MatchResult {
            matched,
            matcher_name: MATCHER_NAME.to_string(),
        })
    }
}
