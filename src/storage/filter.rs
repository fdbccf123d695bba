//! Backend-agnostic filter expressions and their translation.
//!
//! A [`Filter`] maps field names to either a literal (equality) or a single
//! comparison (`gt`, `lt`, `eq`). All conditions are ANDed. Validation happens
//! here, before any backend sees the filter, so both backends reject the same
//! inputs with the same error.

use std::collections::BTreeMap;

use chrono::{DateTime, SubsecRound, Utc};
use thiserror::Error;

use super::value::{Document, FieldValue};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("Filter must be an object of field conditions")]
    NotAnObject,
    #[error("Unsupported operator in filter for field '{field}': {operator}")]
    UnsupportedOperator { field: String, operator: String },
    #[error("Unsupported value in filter for field '{field}'")]
    UnsupportedValue { field: String },
    #[error("Unknown field '{field}' for {collection}")]
    UnknownField { field: String, collection: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Gt,
    Lt,
    Eq,
}

impl Operator {
    /// Accepts both the bare and the `$`-prefixed document-store spelling.
    pub fn parse(key: &str) -> Option<Self> {
        match key.strip_prefix('$').unwrap_or(key) {
            "gt" => Some(Operator::Gt),
            "lt" => Some(Operator::Lt),
            "eq" => Some(Operator::Eq),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Eq => "=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Literal(FieldValue),
    Comparison(Operator, FieldValue),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: BTreeMap<String, Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.with(field, Condition::Literal(value.into()))
    }

    pub fn gt(self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.with(field, Condition::Comparison(Operator::Gt, value.into()))
    }

    pub fn lt(self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.with(field, Condition::Comparison(Operator::Lt, value.into()))
    }

    pub fn with(mut self, field: impl Into<String>, condition: Condition) -> Self {
        self.conditions.insert(field.into(), condition);
        self
    }

    pub fn conditions(&self) -> impl Iterator<Item = (&str, &Condition)> {
        self.conditions.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Parse a loosely-typed filter object such as
    /// `{"email": "a@x.com", "reset_token_expiry": {"$gt": "..."}}`.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, FilterError> {
        let object = value.as_object().ok_or(FilterError::NotAnObject)?;
        let mut filter = Filter::new();

        for (field, raw) in object {
            let condition = match raw {
                serde_json::Value::Object(comparison) => {
                    let mut entries = comparison.iter();
                    let (key, operand) = match (entries.next(), entries.next()) {
                        (Some(entry), None) => entry,
                        _ => {
                            let keys: Vec<&str> = comparison.keys().map(String::as_str).collect();
                            return Err(FilterError::UnsupportedOperator {
                                field: field.clone(),
                                operator: format!("{{{}}}", keys.join(", ")),
                            });
                        }
                    };
                    let op = Operator::parse(key).ok_or_else(|| {
                        FilterError::UnsupportedOperator {
                            field: field.clone(),
                            operator: key.clone(),
                        }
                    })?;
                    let operand = FieldValue::from_json(operand).ok_or_else(|| {
                        FilterError::UnsupportedValue {
                            field: field.clone(),
                        }
                    })?;
                    Condition::Comparison(op, operand)
                }
                other => Condition::Literal(FieldValue::from_json(other).ok_or_else(|| {
                    FilterError::UnsupportedValue {
                        field: field.clone(),
                    }
                })?),
            };
            filter = filter.with(field.clone(), condition);
        }

        Ok(filter)
    }

    /// Check every field against the entity's known field set.
    pub fn validate(&self, collection: &str, fields: &[&str]) -> Result<(), FilterError> {
        for field in self.conditions.keys() {
            check_field(collection, fields, field)?;
        }
        Ok(())
    }

    /// Parse text operands on timestamp fields into timestamps, so both
    /// backends compare instants rather than strings. Any other operand on such
    /// a field, except null or a timestamp, is rejected.
    pub fn coerce_timestamps(self, timestamps: &[&str]) -> Result<Filter, FilterError> {
        let mut conditions = self.conditions;
        for (field, condition) in conditions.iter_mut() {
            if !timestamps.contains(&field.as_str()) {
                continue;
            }
            let value = match condition {
                Condition::Literal(value) | Condition::Comparison(_, value) => value,
            };
            let parsed = match &*value {
                FieldValue::Null => continue,
                FieldValue::Timestamp(ts) => Some(*ts),
                FieldValue::Text(text) => DateTime::parse_from_rfc3339(text)
                    .ok()
                    .map(|ts| ts.with_timezone(&Utc)),
                _ => None,
            };
            let ts = parsed.ok_or_else(|| FilterError::UnsupportedValue {
                field: field.clone(),
            })?;
            // Stored timestamps keep microseconds on both backends
            *value = FieldValue::Timestamp(ts.trunc_subsecs(6));
        }
        Ok(Filter { conditions })
    }

    fn prepare(
        &self,
        collection: &str,
        fields: &[&str],
        timestamps: &[&str],
    ) -> Result<Filter, FilterError> {
        self.validate(collection, fields)?;
        self.clone().coerce_timestamps(timestamps)
    }

    /// Translate into a relational predicate.
    pub fn to_sql(
        &self,
        collection: &str,
        fields: &[&str],
        timestamps: &[&str],
    ) -> Result<SqlPredicate, FilterError> {
        let filter = self.prepare(collection, fields, timestamps)?;

        let terms = filter
            .conditions
            .iter()
            .map(|(field, condition)| {
                let (op, value) = match condition {
                    Condition::Literal(value) => (Operator::Eq, value),
                    Condition::Comparison(op, value) => (*op, value),
                };
                let test = match (op, value) {
                    (Operator::Eq, FieldValue::Null) => SqlTest::IsNull,
                    _ => SqlTest::Compare(op, value.clone()),
                };
                SqlTerm {
                    column: field.clone(),
                    test,
                }
            })
            .collect();

        Ok(SqlPredicate { terms })
    }

    /// Document stores speak these operators natively: the filter passes through
    /// as-is once validated and its timestamp operands are parsed.
    pub fn to_document(
        &self,
        collection: &str,
        fields: &[&str],
        timestamps: &[&str],
    ) -> Result<DocumentQuery, FilterError> {
        Ok(DocumentQuery {
            filter: self.prepare(collection, fields, timestamps)?,
        })
    }
}

pub(crate) fn check_field(collection: &str, fields: &[&str], field: &str) -> Result<(), FilterError> {
    if fields.contains(&field) {
        Ok(())
    } else {
        Err(FilterError::UnknownField {
            field: field.to_string(),
            collection: collection.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlTest {
    IsNull,
    Compare(Operator, FieldValue),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlTerm {
    pub column: String,
    pub test: SqlTest,
}

/// A conjunction of column tests with positional bind values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlPredicate {
    pub terms: Vec<SqlTerm>,
}

impl SqlPredicate {
    /// Render the clause with `?` placeholders, e.g. `email = ? AND size > ?`.
    pub fn clause(&self) -> String {
        self.terms
            .iter()
            .map(|term| match &term.test {
                SqlTest::IsNull => format!("{} IS NULL", term.column),
                SqlTest::Compare(op, _) => format!("{} {} ?", term.column, op.as_sql()),
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Bind values in placeholder order.
    pub fn binds(&self) -> Vec<&FieldValue> {
        self.terms
            .iter()
            .filter_map(|term| match &term.test {
                SqlTest::IsNull => None,
                SqlTest::Compare(_, value) => Some(value),
            })
            .collect()
    }
}

/// A validated filter ready for the document store's matcher.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentQuery {
    filter: Filter,
}

impl DocumentQuery {
    pub fn matches(&self, doc: &Document) -> bool {
        self.filter.conditions.iter().all(|(field, condition)| {
            let actual = doc.get(field).unwrap_or(&FieldValue::Null);
            match condition {
                Condition::Literal(expected) | Condition::Comparison(Operator::Eq, expected) => {
                    if expected.is_null() {
                        actual.is_null()
                    } else {
                        actual.compare(expected) == Some(std::cmp::Ordering::Equal)
                    }
                }
                Condition::Comparison(Operator::Gt, bound) => {
                    actual.compare(bound) == Some(std::cmp::Ordering::Greater)
                }
                Condition::Comparison(Operator::Lt, bound) => {
                    actual.compare(bound) == Some(std::cmp::Ordering::Less)
                }
            }
        })
    }
}
