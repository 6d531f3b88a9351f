// Feature style matching: which rule of a layer applies to a feature.

use crate::feature::Feature;
use crate::model::{Operator, RuleList, StyleRule};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;

/// Which rule wins when several match the same feature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Earliest matching rule wins; later rules are not evaluated
    #[default]
    FirstMatch,
    /// Latest matching rule wins, so later rules override earlier ones
    LastMatch,
}

/// The winning rule and its position in the layer's rule list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchedRule<'a> {
    pub index: usize,
    pub rule: &'a StyleRule,
}

/// First rule, in stored order, whose condition holds for `feature`.
pub fn match_style<'a>(feature: &Feature, rules: &'a RuleList) -> Option<MatchedRule<'a>> {
    match_style_with(feature, rules, MatchPolicy::FirstMatch)
}

pub fn match_style_with<'a>(
    feature: &Feature,
    rules: &'a RuleList,
    policy: MatchPolicy,
) -> Option<MatchedRule<'a>> {
    let matches = |(_, rule): &(usize, &'a StyleRule)| rule_matches(feature, rule);
    let found = match policy {
        MatchPolicy::FirstMatch => rules.iter().enumerate().find(matches),
        MatchPolicy::LastMatch => rules.iter().enumerate().rev().find(matches),
    };
    found.map(|(index, rule)| MatchedRule { index, rule })
}

pub fn rule_matches(feature: &Feature, rule: &StyleRule) -> bool {
    evaluate(
        rule.operator,
        feature.attribute(&rule.attribute_key),
        &rule.attribute_value,
    )
}

/// Evaluate one operator. `actual` is `None` when the feature lacks the key.
///
/// Only `exists` can match a missing attribute. Values that cannot be
/// compared the way the operator needs (non-numeric for `greaterThan`,
/// lists and objects for text operators) are non-matches, never errors.
pub fn evaluate(operator: Operator, actual: Option<&Value>, expected: &str) -> bool {
    let Some(actual) = actual else {
        return false;
    };

    match operator {
        Operator::Exists => true,
        Operator::Equals => attribute_text(actual).is_some_and(|text| text == expected),
        Operator::NotEquals => attribute_text(actual).is_some_and(|text| text != expected),
        Operator::Contains => attribute_text(actual).is_some_and(|text| text.contains(expected)),
        Operator::GreaterThan => compare_numbers(actual, expected).is_some_and(|(a, b)| a > b),
        Operator::LessThan => compare_numbers(actual, expected).is_some_and(|(a, b)| a < b),
    }
}

/// Text form of a scalar attribute; `None` for null, lists and objects.
fn attribute_text(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::String(s) => Some(Cow::Borrowed(s.as_str())),
        Value::Number(n) => Some(Cow::Owned(n.to_string())),
        Value::Bool(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn compare_numbers(actual: &Value, expected: &str) -> Option<(f64, f64)> {
    let a = match actual {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_finite(s),
        _ => None,
    }?;
    let b = parse_finite(expected)?;
    Some((a, b))
}

fn parse_finite(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
