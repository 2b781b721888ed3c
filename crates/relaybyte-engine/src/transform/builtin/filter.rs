//! `dx_filter`: keep records whose column satisfies a condition.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use regex::Regex;
use relaybyte_types::{Column, Record};

use super::target_column;
use crate::transform::{StageArgs, StageContext, Transformer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Like,
    NotLike,
    Gt,
    Lt,
    Eq,
    Ne,
    Ge,
    Le,
}

impl FilterOp {
    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Gt => ordering == Ordering::Greater,
            Self::Lt => ordering == Ordering::Less,
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Ge => ordering != Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Like | Self::NotLike => false,
        }
    }
}

impl FromStr for FilterOp {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_ascii_lowercase().as_str() {
            "like" => Ok(Self::Like),
            "not like" => Ok(Self::NotLike),
            ">" => Ok(Self::Gt),
            "<" => Ok(Self::Lt),
            "=" | "==" => Ok(Self::Eq),
            "!=" => Ok(Self::Ne),
            ">=" => Ok(Self::Ge),
            "<=" => Ok(Self::Le),
            _ => bail!("unsupported filter operator '{s}'"),
        }
    }
}

/// A parsed `column op value` condition.
#[derive(Debug, Clone)]
pub struct FilterCondition {
    column: usize,
    op: FilterOp,
    value: String,
    pattern: Option<Regex>,
}

impl FilterCondition {
    /// Parse `[op, value]` against the stage's column.
    ///
    /// # Errors
    ///
    /// Fails on a missing column or parameter, an unknown operator, or a
    /// `like` pattern that is not a valid regex.
    pub fn parse(args: &StageArgs) -> anyhow::Result<Self> {
        let column = args.column()?;
        let op: FilterOp = args.param(0)?.parse()?;
        let value = args.param(1)?.to_string();
        let pattern = match op {
            FilterOp::Like | FilterOp::NotLike => Some(
                Regex::new(&format!("^(?:{value})$"))
                    .with_context(|| format!("invalid like pattern '{value}'"))?,
            ),
            _ => None,
        };
        Ok(Self {
            column,
            op,
            value,
            pattern,
        })
    }

    #[must_use]
    pub fn column(&self) -> usize {
        self.column
    }

    #[must_use]
    pub fn op(&self) -> FilterOp {
        self.op
    }

    /// Whether `column` satisfies the condition.
    ///
    /// # Errors
    ///
    /// Fails when a numeric comparison meets a non-numeric value.
    pub fn matches(&self, column: &Column) -> anyhow::Result<bool> {
        if column.is_null() {
            let wants_null = self.value.eq_ignore_ascii_case("null");
            return Ok(match self.op {
                FilterOp::Eq => wants_null,
                FilterOp::Ne => !wants_null,
                _ => false,
            });
        }
        if let Some(pattern) = &self.pattern {
            let text = column.as_string().unwrap_or_default();
            let hit = pattern.is_match(&text);
            return Ok(if self.op == FilterOp::Like { hit } else { !hit });
        }
        Ok(self.op.accepts(self.compare(column)?))
    }

    fn compare(&self, column: &Column) -> anyhow::Result<Ordering> {
        let value = self.value.trim();
        match column {
            Column::Long(v) => compare_long(*v, value),
            Column::Date(d) => compare_long(d.timestamp_millis(), value),
            Column::Double(v) => {
                let target: f64 = value
                    .parse()
                    .with_context(|| format!("'{value}' is not a number"))?;
                compare_f64(*v, target)
            }
            Column::String(s) => match value.parse::<f64>() {
                Ok(target) => {
                    let current: f64 = s.trim().parse().map_err(|_| {
                        anyhow!("column value '{s}' is not numeric, cannot compare with {value}")
                    })?;
                    compare_f64(current, target)
                }
                Err(_) => Ok(s.as_str().cmp(value)),
            },
            Column::Bool(b) => Ok(b.to_string().as_str().cmp(value)),
            Column::Bytes(b) => Ok((*String::from_utf8_lossy(b)).cmp(value)),
            Column::Null => Err(anyhow!("cannot compare a null column")),
        }
    }
}

fn compare_long(current: i64, value: &str) -> anyhow::Result<Ordering> {
    if let Ok(target) = value.parse::<i64>() {
        return Ok(current.cmp(&target));
    }
    let target: f64 = value
        .parse()
        .with_context(|| format!("'{value}' is not a number"))?;
    #[allow(clippy::cast_precision_loss)]
    let current = current as f64;
    compare_f64(current, target)
}

fn compare_f64(current: f64, target: f64) -> anyhow::Result<Ordering> {
    current
        .partial_cmp(&target)
        .ok_or_else(|| anyhow!("cannot compare {current} with {target}"))
}

/// Built-in filter stage. Bound instances carry a pre-parsed condition.
#[derive(Debug, Default)]
pub struct FilterTransformer {
    condition: Option<FilterCondition>,
}

impl Transformer for FilterTransformer {
    fn name(&self) -> &str {
        "dx_filter"
    }

    fn evaluate(
        &self,
        record: Record,
        _context: &StageContext,
        args: &StageArgs,
    ) -> anyhow::Result<Option<Record>> {
        let condition = match &self.condition {
            Some(condition) => Cow::Borrowed(condition),
            None => Cow::Owned(FilterCondition::parse(args)?),
        };
        let keep = condition.matches(target_column(&record, condition.column)?)?;
        Ok(keep.then_some(record))
    }

    fn validate(&self, args: &StageArgs) -> anyhow::Result<()> {
        FilterCondition::parse(args).map(|_| ())
    }

    fn instantiate(
        &self,
        args: &StageArgs,
        _context: &StageContext,
    ) -> anyhow::Result<Option<Arc<dyn Transformer>>> {
        Ok(Some(Arc::new(Self {
            condition: Some(FilterCondition::parse(args)?),
        })))
    }
}
