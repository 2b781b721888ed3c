//! `dx_pad`: pad or truncate a column to a fixed character length.

use anyhow::bail;
use relaybyte_types::{Column, Record};

use super::target_column;
use crate::transform::{StageArgs, StageContext, Transformer};

/// Params: `[l|r, length, pad]`. Longer values are cut to `length`
/// characters; nulls are treated as the empty string.
#[derive(Debug, Default)]
pub struct PadTransformer;

fn side(args: &StageArgs) -> anyhow::Result<bool> {
    match args.param(0)?.trim() {
        "l" | "L" => Ok(true),
        "r" | "R" => Ok(false),
        other => bail!("pad side must be 'l' or 'r', got '{other}'"),
    }
}

fn pad_text(args: &StageArgs) -> anyhow::Result<&str> {
    let pad = args.param(2)?;
    if pad.is_empty() {
        bail!("pad string must not be empty");
    }
    Ok(pad)
}

impl Transformer for PadTransformer {
    fn name(&self) -> &str {
        "dx_pad"
    }

    fn evaluate(
        &self,
        mut record: Record,
        _context: &StageContext,
        args: &StageArgs,
    ) -> anyhow::Result<Option<Record>> {
        let index = args.column()?;
        let left = side(args)?;
        let length: usize = args.parse_param(1, "length")?;
        let pad = pad_text(args)?;

        let text = target_column(&record, index)?
            .as_string()
            .unwrap_or_default();
        let current = text.chars().count();
        let padded: String = if current >= length {
            text.chars().take(length).collect()
        } else {
            let fill: String = pad.chars().cycle().take(length - current).collect();
            if left {
                fill + &text
            } else {
                text + &fill
            }
        };
        record.set_column(index, Column::String(padded));
        Ok(Some(record))
    }

    fn validate(&self, args: &StageArgs) -> anyhow::Result<()> {
        args.column()?;
        side(args)?;
        args.parse_param::<usize>(1, "length")?;
        pad_text(args)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pad(column: Column, side: &str, length: &str, with: &str) -> Column {
        let args = StageArgs::new(Some(0), vec![side.into(), length.into(), with.into()]);
        PadTransformer
            .evaluate(Record::from_columns(vec![column]), &StageContext::new(), &args)
            .unwrap()
            .unwrap()
            .column(0)
            .cloned()
            .unwrap()
    }

    #[test]
    fn pads_left_and_right() {
        assert_eq!(pad(Column::from("7"), "l", "3", "0"), Column::from("007"));
        assert_eq!(pad(Column::from("ab"), "r", "5", "xy"), Column::from("abxyx"));
    }

    #[test]
    fn truncates_long_values() {
        assert_eq!(pad(Column::from("abcdef"), "l", "3", "0"), Column::from("abc"));
    }

    #[test]
    fn null_becomes_padding() {
        assert_eq!(pad(Column::Null, "r", "2", "-"), Column::from("--"));
    }

    #[test]
    fn validate_checks_side_and_pad() {
        let bad_side = StageArgs::new(Some(0), vec!["c".into(), "3".into(), "0".into()]);
        assert!(PadTransformer.validate(&bad_side).is_err());
        let empty_pad = StageArgs::new(Some(0), vec!["l".into(), "3".into(), String::new()]);
        assert!(PadTransformer.validate(&empty_pad).is_err());
    }
}
