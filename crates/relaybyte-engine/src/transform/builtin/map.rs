//! `dx_map`: decimal arithmetic on a numeric column.

use std::str::FromStr;

use anyhow::{anyhow, bail, Context};
use bigdecimal::{BigDecimal, One, RoundingMode, ToPrimitive, Zero};
use relaybyte_types::{Column, Record};

use super::target_column;
use crate::transform::{StageArgs, StageContext, Transformer};

/// Largest exponent accepted by `^`.
const MAX_EXPONENT: u32 = 1024;
/// Scale of a quotient when the column value has no fractional digits.
const DEFAULT_DIVIDE_SCALE: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

impl FromStr for MapOp {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "+" => Ok(Self::Add),
            "-" => Ok(Self::Sub),
            "*" => Ok(Self::Mul),
            "/" => Ok(Self::Div),
            "%" => Ok(Self::Rem),
            "^" => Ok(Self::Pow),
            other => bail!("unsupported map operator '{other}'"),
        }
    }
}

impl MapOp {
    /// Apply the operator. `scale` is the number of fractional digits the
    /// left operand was written with.
    ///
    /// # Errors
    ///
    /// Fails on division or remainder by zero and on an exponent that is
    /// not an integer in `0..=1024`.
    pub fn apply(self, lhs: &BigDecimal, rhs: &BigDecimal, scale: i64) -> anyhow::Result<BigDecimal> {
        Ok(match self {
            Self::Add => lhs + rhs,
            Self::Sub => lhs - rhs,
            Self::Mul => lhs * rhs,
            Self::Div => {
                if rhs.is_zero() {
                    bail!("division by zero");
                }
                let scale = if scale > 0 { scale } else { DEFAULT_DIVIDE_SCALE };
                (lhs / rhs).with_scale_round(scale, RoundingMode::HalfUp)
            }
            Self::Rem => {
                if rhs.is_zero() {
                    bail!("division by zero");
                }
                lhs % rhs
            }
            Self::Pow => {
                let exponent = rhs
                    .is_integer()
                    .then(|| rhs.to_u32())
                    .flatten()
                    .filter(|e| *e <= MAX_EXPONENT)
                    .ok_or_else(|| {
                        anyhow!("exponent must be an integer between 0 and {MAX_EXPONENT}, got {rhs}")
                    })?;
                power(lhs, exponent)
            }
        })
    }
}

fn power(base: &BigDecimal, mut exponent: u32) -> BigDecimal {
    let mut result = BigDecimal::one();
    let mut factor = base.clone();
    while exponent > 0 {
        if exponent & 1 == 1 {
            result = &result * &factor;
        }
        exponent >>= 1;
        if exponent > 0 {
            factor = &factor * &factor;
        }
    }
    result
}

fn fraction_digits(text: &str) -> i64 {
    text.split_once('.')
        .map_or(0, |(_, fraction)| i64::try_from(fraction.len()).unwrap_or(i64::MAX))
}

fn operand(args: &StageArgs) -> anyhow::Result<BigDecimal> {
    let raw = args.param(1)?;
    BigDecimal::from_str(raw.trim()).with_context(|| format!("invalid map operand '{raw}'"))
}

/// Params: `[op, value]` with `op` one of `+ - * / % ^`. Long columns stay
/// long when the result is integral, doubles stay doubles, strings hold the
/// decimal text. Nulls pass through.
#[derive(Debug, Default)]
pub struct MapTransformer;

impl Transformer for MapTransformer {
    fn name(&self) -> &str {
        "dx_map"
    }

    fn evaluate(
        &self,
        mut record: Record,
        _context: &StageContext,
        args: &StageArgs,
    ) -> anyhow::Result<Option<Record>> {
        let index = args.column()?;
        let op: MapOp = args.param(0)?.parse()?;
        let rhs = operand(args)?;

        let column = target_column(&record, index)?;
        let (lhs, text) = match column {
            Column::Null => return Ok(Some(record)),
            Column::Long(v) => (BigDecimal::from(*v), v.to_string()),
            Column::Double(v) => {
                let text = v.to_string();
                let value = BigDecimal::from_str(&text)
                    .with_context(|| format!("column value {v} is not a finite number"))?;
                (value, text)
            }
            Column::String(s) => {
                let text = s.trim().to_string();
                let value = BigDecimal::from_str(&text)
                    .with_context(|| format!("column value '{s}' is not numeric"))?;
                (value, text)
            }
            other => bail!("dx_map does not support {} columns", other.kind()),
        };

        let result = op.apply(&lhs, &rhs, fraction_digits(&text))?;
        let mapped = match column {
            Column::Long(_) if result.is_integer() => match result.to_i64() {
                Some(v) => Column::Long(v),
                None => Column::String(result.to_string()),
            },
            Column::Long(_) | Column::Double(_) => Column::Double(
                result
                    .to_f64()
                    .ok_or_else(|| anyhow!("result {result} does not fit a double"))?,
            ),
            _ => Column::String(result.to_string()),
        };
        record.set_column(index, mapped);
        Ok(Some(record))
    }

    fn validate(&self, args: &StageArgs) -> anyhow::Result<()> {
        args.column()?;
        args.param(0)?.parse::<MapOp>()?;
        operand(args)?;
        Ok(())
    }
}
