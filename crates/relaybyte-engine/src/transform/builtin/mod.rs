//! Built-in transform stages.

mod filter;
mod map;
mod pad;
mod replace;
mod script;
mod substr;

use std::sync::Arc;

use anyhow::anyhow;
use relaybyte_runtime::PluginLoader;
use relaybyte_types::{Column, Record};

pub use filter::{FilterCondition, FilterOp, FilterTransformer};
pub use map::{MapOp, MapTransformer};
pub use pad::PadTransformer;
pub use replace::ReplaceTransformer;
pub use script::{ScriptTransformer, SCRIPT_ENTRY};
pub use substr::SubstrTransformer;

use crate::transform::Transformer;

/// Every built-in stage, ready to register.
#[must_use]
pub fn all(loader: &Arc<PluginLoader>) -> Vec<Arc<dyn Transformer>> {
    vec![
        Arc::new(FilterTransformer::default()),
        Arc::new(ReplaceTransformer),
        Arc::new(PadTransformer),
        Arc::new(SubstrTransformer),
        Arc::new(MapTransformer),
        Arc::new(ScriptTransformer::new(Arc::clone(loader))),
    ]
}

fn target_column(record: &Record, index: usize) -> anyhow::Result<&Column> {
    record.column(index).ok_or_else(|| {
        anyhow!(
            "column index {index} is outside the record ({} columns)",
            record.column_count()
        )
    })
}

/// Character slice `[start, start + length)` clipped at the end of `chars`.
fn char_range(chars: &[char], start: usize, length: usize) -> anyhow::Result<(usize, usize)> {
    if start > chars.len() {
        return Err(anyhow!(
            "start {start} is beyond the value length {}",
            chars.len()
        ));
    }
    Ok((start, start.saturating_add(length).min(chars.len())))
}
