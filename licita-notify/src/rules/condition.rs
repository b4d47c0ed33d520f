//! Rule conditions and their evaluation against event data.

use std::cmp::Ordering;

use notify_template::lookup;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Comparison applied by a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    /// Substring for strings, membership for arrays.
    Contains,
    GreaterThan,
    LessThan,
    /// Field value is a member of the condition's array (or a substring of its string).
    In,
    /// Field is present and not null.
    Exists,
}

/// How a clause combines with the one after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Logic {
    #[default]
    #[serde(alias = "and")]
    And,
    #[serde(alias = "or")]
    Or,
}

/// One clause of a rule's condition list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Dot-path into the event data.
    pub field: String,
    pub operator: Operator,
    /// Absent is distinct from an explicit `null`.
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<Value>,
    /// Combines this clause's result with the next clause's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logic: Option<Logic>,
}

fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value: Some(value),
            logic: None,
        }
    }

    /// An `exists` clause.
    pub fn exists(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator: Operator::Exists,
            value: None,
            logic: None,
        }
    }

    pub fn with_logic(mut self, logic: Logic) -> Self {
        self.logic = Some(logic);
        self
    }

    /// Evaluate this clause alone.
    pub fn matches(&self, data: &Value) -> bool {
        let field = lookup(data, &self.field);
        let expected = self.value.as_ref();

        match self.operator {
            Operator::Exists => field.is_some_and(|v| !v.is_null()),
            Operator::NotEquals => match (field, expected) {
                (Some(actual), Some(expected)) => !loose_eq(actual, expected),
                (None, None) => false,
                _ => true,
            },
            Operator::Equals => match (field, expected) {
                (Some(actual), Some(expected)) => loose_eq(actual, expected),
                _ => false,
            },
            Operator::Contains => match (field, expected) {
                (Some(Value::String(haystack)), Some(Value::String(needle))) => {
                    haystack.contains(needle.as_str())
                }
                (Some(Value::Array(items)), Some(expected)) => {
                    items.iter().any(|item| loose_eq(item, expected))
                }
                _ => false,
            },
            Operator::GreaterThan => {
                compare(field, expected).is_some_and(|ord| ord == Ordering::Greater)
            }
            Operator::LessThan => compare(field, expected).is_some_and(|ord| ord == Ordering::Less),
            Operator::In => match (field, expected) {
                (Some(actual), Some(Value::Array(options))) => {
                    options.iter().any(|option| loose_eq(actual, option))
                }
                (Some(Value::String(actual)), Some(Value::String(options))) => {
                    options.contains(actual.as_str())
                }
                _ => false,
            },
        }
    }
}

/// Evaluate a clause list as a left-to-right fold.
///
/// The first clause seeds the result; every later clause is combined using
/// the previous clause's `logic` (AND when unset). No precedence applies, so
/// `a OR b AND c` is `(a OR b) AND c`. An empty list matches.
pub fn evaluate(conditions: &[Condition], data: &Value) -> bool {
    let Some((first, rest)) = conditions.split_first() else {
        return true;
    };

    let mut result = first.matches(data);
    let mut logic = first.logic.unwrap_or_default();
    for condition in rest {
        let current = condition.matches(data);
        result = match logic {
            Logic::And => result && current,
            Logic::Or => result || current,
        };
        logic = condition.logic.unwrap_or_default();
    }
    result
}

/// Equality with numbers compared by value, so `1` equals `1.0`.
fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Ordering between two values. Strings compare lexically with each other;
/// otherwise both sides must be numbers or numeric strings.
fn compare(field: Option<&Value>, expected: Option<&Value>) -> Option<Ordering> {
    let (field, expected) = (field?, expected?);
    if let (Value::String(a), Value::String(b)) = (field, expected) {
        return Some(a.cmp(b));
    }
    as_number(field)?.partial_cmp(&as_number(expected)?)
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn data() -> Value {
        json!({
            "meAdvantage": true,
            "value": 150000,
            "modality": "pregao",
            "title": "Aquisição de notebooks",
            "tags": ["ti", "hardware"],
            "organ": {"state": "SP", "name": "Prefeitura"},
            "closed": null
        })
    }

    #[rstest]
    #[case(Operator::Equals, "meAdvantage", json!(true), true)]
    #[case(Operator::Equals, "meAdvantage", json!(false), false)]
    #[case(Operator::Equals, "value", json!(150000.0), true)]
    #[case(Operator::Equals, "value", json!("150000"), false)]
    #[case(Operator::NotEquals, "modality", json!("concorrencia"), true)]
    #[case(Operator::NotEquals, "modality", json!("pregao"), false)]
    #[case(Operator::Contains, "title", json!("notebooks"), true)]
    #[case(Operator::Contains, "title", json!("servidores"), false)]
    #[case(Operator::Contains, "tags", json!("ti"), true)]
    #[case(Operator::Contains, "value", json!(1), false)]
    #[case(Operator::GreaterThan, "value", json!(100000), true)]
    #[case(Operator::GreaterThan, "value", json!(150000), false)]
    #[case(Operator::GreaterThan, "value", json!("99999"), true)]
    #[case(Operator::LessThan, "value", json!(200000), true)]
    #[case(Operator::LessThan, "modality", json!("z"), true)]
    #[case(Operator::LessThan, "tags", json!(5), false)]
    #[case(Operator::In, "modality", json!(["pregao", "concorrencia"]), true)]
    #[case(Operator::In, "modality", json!(["leilao"]), false)]
    #[case(Operator::In, "organ.state", json!("SP,RJ,MG"), true)]
    #[case(Operator::Equals, "organ.state", json!("SP"), true)]
    fn test_operator(
        #[case] operator: Operator,
        #[case] field: &str,
        #[case] value: Value,
        #[case] expected: bool,
    ) {
        let condition = Condition::new(field, operator, value);
        assert_eq!(condition.matches(&data()), expected);
    }

    #[rstest]
    #[case(Operator::Equals, json!(1))]
    #[case(Operator::Contains, json!("a"))]
    #[case(Operator::GreaterThan, json!(0))]
    #[case(Operator::LessThan, json!(0))]
    #[case(Operator::In, json!(["a"]))]
    fn test_missing_field_fails(#[case] operator: Operator, #[case] value: Value) {
        let condition = Condition::new("organ.city", operator, value);
        assert!(!condition.matches(&data()));
    }

    #[test]
    fn test_missing_field_not_equals() {
        assert!(Condition::new("missing", Operator::NotEquals, json!(1)).matches(&data()));

        let against_nothing = Condition {
            field: "missing".into(),
            operator: Operator::NotEquals,
            value: None,
            logic: None,
        };
        assert!(!against_nothing.matches(&data()));
    }

    #[test]
    fn test_exists() {
        assert!(Condition::exists("organ.name").matches(&data()));
        assert!(!Condition::exists("organ.city").matches(&data()));
        assert!(!Condition::exists("closed").matches(&data()));
    }

    #[test]
    fn test_empty_list_matches() {
        assert!(evaluate(&[], &data()));
    }

    #[test]
    fn test_fold_uses_previous_logic() {
        let t = Condition::new("meAdvantage", Operator::Equals, json!(true));
        let f = Condition::new("meAdvantage", Operator::Equals, json!(false));

        // false OR true AND true  =>  (false OR true) AND true
        let conditions = vec![
            f.clone().with_logic(Logic::Or),
            t.clone(),
            t.clone(),
        ];
        assert!(evaluate(&conditions, &data()));

        // true OR false AND false  =>  (true OR false) AND false
        let conditions = vec![t.clone().with_logic(Logic::Or), f.clone(), f.clone()];
        assert!(!evaluate(&conditions, &data()));

        // The last clause's logic is never consulted.
        let conditions = vec![t.clone(), t.with_logic(Logic::Or)];
        assert!(evaluate(&conditions, &data()));
    }

    #[test]
    fn test_condition_deserialization() {
        let json = r#"[
            {"field": "meAdvantage", "operator": "equals", "value": true, "logic": "OR"},
            {"field": "closed", "operator": "equals", "value": null},
            {"field": "organ", "operator": "exists"}
        ]"#;
        let conditions: Vec<Condition> = serde_json::from_str(json).unwrap();
        assert_eq!(conditions[0].logic, Some(Logic::Or));
        assert_eq!(conditions[1].value, Some(Value::Null));
        assert_eq!(conditions[2].value, None);
        assert!(conditions[1].matches(&data()));
    }
}
