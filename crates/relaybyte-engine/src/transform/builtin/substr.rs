//! `dx_substr`: keep a character range of a column.

use relaybyte_types::{Column, Record};

use super::{char_range, target_column};
use crate::transform::{StageArgs, StageContext, Transformer};

/// Params: `[start, length]`, character based; nulls pass through.
#[derive(Debug, Default)]
pub struct SubstrTransformer;

impl Transformer for SubstrTransformer {
    fn name(&self) -> &str {
        "dx_substr"
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

        let column = target_column(&record, index)?;
        let Some(text) = column.as_string() else {
            return Ok(Some(record));
        };
        let chars: Vec<char> = text.chars().collect();
        let (start, end) = char_range(&chars, start, length)?;
        record.set_column(index, Column::String(chars[start..end].iter().collect()));
        Ok(Some(record))
    }

    fn validate(&self, args: &StageArgs) -> anyhow::Result<()> {
        args.column()?;
        args.parse_param::<usize>(0, "start")?;
        args.parse_param::<usize>(1, "length")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn substr(column: Column, start: &str, length: &str) -> anyhow::Result<Column> {
        let args = StageArgs::new(Some(0), vec![start.into(), length.into()]);
        let out = SubstrTransformer
            .evaluate(Record::from_columns(vec![column]), &StageContext::new(), &args)?
            .unwrap();
        Ok(out.column(0).cloned().unwrap())
    }

    #[test]
    fn takes_range() {
        assert_eq!(substr(Column::from("abcdef"), "2", "3").unwrap(), Column::from("cde"));
        assert_eq!(substr(Column::from("abc"), "1", "99").unwrap(), Column::from("bc"));
        assert_eq!(substr(Column::from("abc"), "3", "1").unwrap(), Column::from(""));
    }

    #[test]
    fn start_beyond_value_fails() {
        assert!(substr(Column::from("abc"), "5", "1").is_err());
    }

    #[test]
    fn null_passes_through() {
        assert_eq!(substr(Column::Null, "0", "2").unwrap(), Column::Null);
    }

    #[test]
    fn bad_params_rejected() {
        let args = StageArgs::new(Some(0), vec!["-1".into(), "2".into()]);
        assert!(SubstrTransformer.validate(&args).is_err());
        let args = StageArgs::new(Some(0), vec!["1".into()]);
        assert!(SubstrTransformer.validate(&args).is_err());
    }
}
