use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::model::{FieldKind, StructField};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equal,
    NotEqual,
    In,
    NotIn,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    Contains,
    StartsWith,
    EndsWith,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equal => "eq",
            Operator::NotEqual => "ne",
            Operator::In => "in",
            Operator::NotIn => "notin",
            Operator::LessThan => "lt",
            Operator::LessEqual => "le",
            Operator::GreaterThan => "gt",
            Operator::GreaterEqual => "ge",
            Operator::Contains => "contains",
            Operator::StartsWith => "startswith",
            Operator::EndsWith => "endswith",
        }
    }

    /// Operators that only need value equality.
    pub fn is_equality(&self) -> bool {
        matches!(
            self,
            Operator::Equal | Operator::NotEqual | Operator::In | Operator::NotIn
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eq" => Ok(Operator::Equal),
            "ne" => Ok(Operator::NotEqual),
            "in" => Ok(Operator::In),
            "notin" => Ok(Operator::NotIn),
            "lt" => Ok(Operator::LessThan),
            "le" => Ok(Operator::LessEqual),
            "gt" => Ok(Operator::GreaterThan),
            "ge" => Ok(Operator::GreaterEqual),
            "contains" => Ok(Operator::Contains),
            "startswith" => Ok(Operator::StartsWith),
            "endswith" => Ok(Operator::EndsWith),
            other => Err(format!("unknown filter operator '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterValues {
    pub operator: Operator,
    pub values: Vec<Value>,
}

/// A filter on one field. For relationship fields the predicate lives in
/// `relationships`, one entry per filtered field of the related type.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterField {
    pub field: StructField,
    pub values: Vec<FilterValues>,
    pub relationships: Vec<FilterField>,
}

impl FilterField {
    pub fn new(field: StructField) -> Self {
        Self {
            field,
            values: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn with_values(mut self, operator: Operator, values: Vec<Value>) -> Self {
        self.values.push(FilterValues { operator, values });
        self
    }

    pub fn with_relationship(mut self, sub: FilterField) -> Self {
        self.relationships.push(sub);
        self
    }

    pub fn name(&self) -> &str {
        &self.field.name
    }

    pub fn kind(&self) -> FieldKind {
        self.field.kind
    }

    pub fn related_collection(&self) -> Option<&str> {
        self.field.related.as_deref()
    }

    /// The value slot a preset writes into: the field's own first values, or
    /// the first values of its first relationship sub-filter.
    pub fn preset_slot(&mut self) -> Option<&mut FilterValues> {
        if !self.values.is_empty() {
            return self.values.first_mut();
        }
        self.relationships
            .first_mut()
            .and_then(|sub| sub.values.first_mut())
    }

    /// The operator/values pair a precheck compares against.
    pub fn precheck_values(&self) -> Option<&FilterValues> {
        if let Some(sub) = self.relationships.first() {
            return sub.values.first();
        }
        self.values.first()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortField {
    pub field: StructField,
    pub order: SortOrder,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pagination {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}
