//! Record model and the pushdown types a store evaluates locally.

use crate::directory::types::PartitionKey;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

/// Valid range for both `score` and `presence`.
pub const VALUE_RANGE: RangeInclusive<f64> = 0.0..=100.0;

/// One row of the logical table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub name: String,
    /// Owning partition. Replica copies keep the owner's key.
    pub partition: PartitionKey,
    pub score: f64,
    pub presence: f64,
}

impl Record {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err(format!("record {} has an empty name", self.id));
        }
        check_value("score", self.score)?;
        check_value("presence", self.presence)?;
        Ok(())
    }

    /// Combined score used by the total ranking.
    pub fn total(&self) -> f64 {
        self.score + self.presence
    }
}

pub fn check_value(field: &str, value: f64) -> Result<(), String> {
    if value.is_finite() && VALUE_RANGE.contains(&value) {
        Ok(())
    } else {
        Err(format!(
            "{} {} outside {}..={}",
            field,
            value,
            VALUE_RANGE.start(),
            VALUE_RANGE.end()
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Id,
    Name,
    Partition,
    Score,
    Presence,
}

impl Column {
    pub fn as_str(&self) -> &'static str {
        match self {
            Column::Id => "id",
            Column::Name => "name",
            Column::Partition => "partition_key",
            Column::Score => "score",
            Column::Presence => "presence",
        }
    }
}

/// Columns a scan returns. There is no "all columns" form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection(pub Vec<Column>);

impl Projection {
    /// Every column needed to rebuild a `Record`.
    pub fn records() -> Self {
        Self(vec![
            Column::Id,
            Column::Name,
            Column::Partition,
            Column::Score,
            Column::Presence,
        ])
    }

    /// Score column only, for the percentile threshold pass.
    pub fn scores() -> Self {
        Self(vec![Column::Score])
    }

    pub fn contains(&self, column: Column) -> bool {
        self.0.contains(&column)
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns: Vec<&str> = self.0.iter().map(|c| c.as_str()).collect();
        f.write_str(&columns.join(", "))
    }
}

/// A scanned row holding only the projected columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectedRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<PartitionKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence: Option<f64>,
}

impl ProjectedRow {
    pub fn project(record: &Record, projection: &Projection) -> Self {
        let mut row = ProjectedRow::default();
        for column in &projection.0 {
            match column {
                Column::Id => row.id = Some(record.id),
                Column::Name => row.name = Some(record.name.clone()),
                Column::Partition => row.partition = Some(record.partition.clone()),
                Column::Score => row.score = Some(record.score),
                Column::Presence => row.presence = Some(record.presence),
            }
        }
        row
    }

    /// Rebuilds a full record; `None` if any column was not projected.
    pub fn into_record(self) -> Option<Record> {
        Some(Record {
            id: self.id?,
            name: self.name?,
            partition: self.partition?,
            score: self.score?,
            presence: self.presence?,
        })
    }
}

/// WHERE-equivalent clause evaluated by a store. Unset fields are not part of
/// the clause; an empty predicate matches every row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodePredicate {
    /// Ownership guard: only rows whose owner is this partition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<PartitionKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_from: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_to: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_max: Option<f64>,
    /// Case-insensitive substring of `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_contains: Option<String>,
    /// Derived percentile threshold (inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_at_least: Option<f64>,
}

impl NodePredicate {
    pub fn matches(&self, record: &Record) -> bool {
        if let Some(owner) = &self.owner
            && &record.partition != owner
        {
            return false;
        }
        if self.id_from.is_some_and(|from| record.id < from)
            || self.id_to.is_some_and(|to| record.id > to)
        {
            return false;
        }
        if self.score_min.is_some_and(|min| record.score < min)
            || self.score_max.is_some_and(|max| record.score > max)
            || self.score_at_least.is_some_and(|t| record.score < t)
        {
            return false;
        }
        if self.presence_min.is_some_and(|min| record.presence < min)
            || self.presence_max.is_some_and(|max| record.presence > max)
        {
            return false;
        }
        if let Some(needle) = &self.name_contains
            && !record.name.to_lowercase().contains(&needle.to_lowercase())
        {
            return false;
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        *self == NodePredicate::default()
    }

    /// Copy of this predicate restricted to rows owned by `owner`.
    pub fn owned_by(&self, owner: &PartitionKey) -> Self {
        Self {
            owner: Some(owner.clone()),
            ..self.clone()
        }
    }
}

impl fmt::Display for NodePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut clauses = Vec::new();
        if let Some(owner) = &self.owner {
            clauses.push(format!("partition_key = '{}'", owner));
        }
        if let Some(from) = self.id_from {
            clauses.push(format!("id >= {}", from));
        }
        if let Some(to) = self.id_to {
            clauses.push(format!("id <= {}", to));
        }
        if let Some(min) = self.score_min {
            clauses.push(format!("score >= {}", min));
        }
        if let Some(max) = self.score_max {
            clauses.push(format!("score <= {}", max));
        }
        if let Some(min) = self.presence_min {
            clauses.push(format!("presence >= {}", min));
        }
        if let Some(max) = self.presence_max {
            clauses.push(format!("presence <= {}", max));
        }
        if let Some(needle) = &self.name_contains {
            clauses.push(format!("name LIKE '%{}%'", needle.replace('\'', "''")));
        }
        if let Some(threshold) = self.score_at_least {
            clauses.push(format!("score >= {}", threshold));
        }

        if clauses.is_empty() {
            f.write_str("TRUE")
        } else {
            f.write_str(&clauses.join(" AND "))
        }
    }
}
