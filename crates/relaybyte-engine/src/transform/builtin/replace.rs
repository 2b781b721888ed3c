//! `dx_replace`: overwrite a character range of a column.

use relaybyte_types::{Column, Record};

use super::{char_range, target_column};
use crate::transform::{StageArgs, StageContext, Transformer};

/// Params: `[start, length, replacement]`. Characters from `start` up to
/// `start + length` (clipped at the end) are replaced; nulls pass through.
#[derive(Debug, Default)]
pub struct ReplaceTransformer;

impl Transformer for ReplaceTransformer {
    fn name(&self) -> &str {
        "dx_replace"
    }

    fn evaluate(
        &self,
        mut record: Record,
        _context: &StageContext,
        args: &StageArgs,
    ) -> anyhow::Result<Option<Record>> {
        let index = args.column()?;
        let start: usize = args.parse_param(0, "start")?;
        let length: usize = args.parse_param(1, "length")?;
        let replacement = args.param(2)?;

        let column = target_column(&record, index)?;
        let Some(text) = column.as_string() else {
            return Ok(Some(record));
        };
        let chars: Vec<char> = text.chars().collect();
        let (start, end) = char_range(&chars, start, length)?;
        let replaced: String = chars[..start]
            .iter()
            .copied()
            .chain(replacement.chars())
            .chain(chars[end..].iter().copied())
            .collect();
        record.set_column(index, Column::String(replaced));
        Ok(Some(record))
    }

    fn validate(&self, args: &StageArgs) -> anyhow::Result<()> {
        args.column()?;
        args.parse_param::<usize>(0, "start")?;
        args.parse_param::<usize>(1, "length")?;
        args.param(2)?;
        Ok(())
    }
}
