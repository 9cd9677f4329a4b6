//! Subscriber parameters and the filters discovery matches them against.

use serde::{Deserialize, Serialize};

/// The value of a parameter, its variant is the parameter type.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    Numeric(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ParamType {
    Text,
    Numeric,
}

/// A named, typed attribute a subscriber registers with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawParam", into = "RawParam")]
pub struct Param {
    pub name: String,
    pub value: ParamValue,
}

/// Comparison operators, text parameters only support `Eq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Gt,
    Lt,
    Gte,
    Lte,
}

/// A predicate over the parameter called `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFilter", into = "RawFilter")]
pub struct ParamFilter {
    pub name: String,
    pub value: ParamValue,
    pub operator: Operator,
}

#[derive(Serialize, Deserialize)]
struct RawParam {
    name: String,
    #[serde(rename = "type")]
    kind: ParamType,
    value: serde_json::Value,
}

#[derive(Serialize, Deserialize)]
struct RawFilter {
    name: String,
    #[serde(rename = "type")]
    kind: ParamType,
    value: serde_json::Value,
    operator: Operator,
}

impl ParamValue {
    fn from_json(kind: ParamType, value: serde_json::Value) -> Result<Self, String> {
        match (kind, value) {
            (ParamType::Text, serde_json::Value::String(s)) => Ok(Self::Text(s)),
            (ParamType::Numeric, serde_json::Value::Number(n)) => n
                .as_f64()
                .map(Self::Numeric)
                .ok_or_else(|| format!("numeric value {n} is out of range")),
            (kind, value) => Err(format!("value {value} is not of type {kind:?}")),
        }
    }

    fn into_json(self) -> (ParamType, serde_json::Value) {
        match self {
            Self::Text(s) => (ParamType::Text, s.into()),
            Self::Numeric(n) => (ParamType::Numeric, n.into()),
        }
    }
}

impl Param {
    pub fn text(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: ParamValue::Text(value.to_string()),
        }
    }

    pub fn numeric(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value: ParamValue::Numeric(value),
        }
    }
}

impl ParamFilter {
    pub fn new(name: &str, operator: Operator, value: ParamValue) -> Self {
        Self {
            name: name.to_string(),
            value,
            operator,
        }
    }

    /// Shorthand for a text equality filter.
    pub fn text_eq(name: &str, value: &str) -> Self {
        Self::new(name, Operator::Eq, ParamValue::Text(value.to_string()))
    }

    /// Evaluates `param <operator> filter value`.
    ///
    /// A parameter of another name or type, or an operator its type does not
    /// support, never matches.
    pub fn matches(&self, param: &Param) -> bool {
        if param.name != self.name {
            return false;
        }

        match (&param.value, &self.value) {
            (ParamValue::Text(have), ParamValue::Text(want)) => {
                self.operator == Operator::Eq && have == want
            }
            (ParamValue::Numeric(have), ParamValue::Numeric(want)) => match self.operator {
                Operator::Eq => have == want,
                Operator::Gt => have > want,
                Operator::Lt => have < want,
                Operator::Gte => have >= want,
                Operator::Lte => have <= want,
            },
            _ => false,
        }
    }
}

impl TryFrom<RawParam> for Param {
    type Error = String;

    fn try_from(raw: RawParam) -> Result<Self, Self::Error> {
        Ok(Self {
            name: raw.name,
            value: ParamValue::from_json(raw.kind, raw.value)?,
        })
    }
}

impl From<Param> for RawParam {
    fn from(param: Param) -> Self {
        let (kind, value) = param.value.into_json();
        Self {
            name: param.name,
            kind,
            value,
        }
    }
}

impl TryFrom<RawFilter> for ParamFilter {
    type Error = String;

    fn try_from(raw: RawFilter) -> Result<Self, Self::Error> {
        Ok(Self {
            name: raw.name,
            value: ParamValue::from_json(raw.kind, raw.value)?,
            operator: raw.operator,
        })
    }
}

impl From<ParamFilter> for RawFilter {
    fn from(filter: ParamFilter) -> Self {
        let (kind, value) = filter.value.into_json();
        Self {
            name: filter.name,
            kind,
            value,
            operator: filter.operator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(operator: Operator, value: f64) -> ParamFilter {
        ParamFilter::new("cores", operator, ParamValue::Numeric(value))
    }

    #[test]
    fn test_text_only_supports_eq() {
        let param = Param::text("role", "worker");

        assert!(ParamFilter::text_eq("role", "worker").matches(&param));
        assert!(!ParamFilter::text_eq("role", "oracle").matches(&param));

        let gt = ParamFilter::new("role", Operator::Gt, ParamValue::Text("a".into()));
        assert!(!gt.matches(&param));
    }

    #[test]
    fn test_numeric_operators() {
        let param = Param::numeric("cores", 8.0);

        assert!(numeric(Operator::Eq, 8.0).matches(&param));
        assert!(numeric(Operator::Gt, 4.0).matches(&param));
        assert!(!numeric(Operator::Gt, 8.0).matches(&param));
        assert!(numeric(Operator::Gte, 8.0).matches(&param));
        assert!(numeric(Operator::Lt, 16.0).matches(&param));
        assert!(!numeric(Operator::Lt, 8.0).matches(&param));
        assert!(numeric(Operator::Lte, 8.0).matches(&param));
    }

    #[test]
    fn test_type_mismatch_never_matches() {
        let text = Param::text("cores", "8");
        assert!(!numeric(Operator::Eq, 8.0).matches(&text));

        let num = Param::numeric("role", 1.0);
        assert!(!ParamFilter::text_eq("role", "1").matches(&num));
    }

    #[test]
    fn test_param_json_shape() {
        let param: Param =
            serde_json::from_str(r#"{"name": "role", "type": "text", "value": "worker"}"#).unwrap();
        assert_eq!(param, Param::text("role", "worker"));

        let json = serde_json::to_value(Param::numeric("cores", 4.0)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "cores", "type": "numeric", "value": 4.0})
        );
    }

    #[test]
    fn test_param_value_must_match_its_type() {
        let res: Result<Param, _> =
            serde_json::from_str(r#"{"name": "cores", "type": "numeric", "value": "eight"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn test_filter_json_shape() {
        let filter: ParamFilter = serde_json::from_str(
            r#"{"name": "cores", "type": "numeric", "value": 2, "operator": "gte"}"#,
        )
        .unwrap();

        assert_eq!(filter, numeric(Operator::Gte, 2.0));
    }
}
