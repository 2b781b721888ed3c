//! Record transform stages and the pipeline that runs them.
//!
//! A stage implements [`Transformer`]. Built-in stages live in
//! [`builtin`]; external stages are WebAssembly modules loaded from local
//! storage and run through [`wasm::WasmTransformer`] inside their plugin
//! scope.

pub mod binding;
pub mod builtin;
pub mod pipeline;
pub mod registry;
pub mod wasm;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use relaybyte_runtime::IsolationScope;
use relaybyte_types::Record;

pub use binding::{build_stages, StageBinding};
pub use pipeline::{TransformPipeline, TransformStats};
pub use registry::TransformerRegistry;

/// Name of the inline-script stage.
pub const SCRIPT_STAGE: &str = "dx_script";

/// Free-form per-stage context handed to every evaluation.
pub type StageContext = BTreeMap<String, serde_json::Value>;

/// Positional stage arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageArgs {
    /// Target column, when the stage works on one.
    pub column_index: Option<usize>,
    pub params: Vec<String>,
}

impl StageArgs {
    #[must_use]
    pub fn new(column_index: Option<usize>, params: Vec<String>) -> Self {
        Self {
            column_index,
            params,
        }
    }

    /// The target column.
    ///
    /// # Errors
    ///
    /// Fails when no column index was configured.
    pub fn column(&self) -> anyhow::Result<usize> {
        self.column_index
            .ok_or_else(|| anyhow!("column_index is required"))
    }

    /// Parameter `index` as text.
    ///
    /// # Errors
    ///
    /// Fails when the parameter is missing.
    pub fn param(&self, index: usize) -> anyhow::Result<&str> {
        self.params
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| anyhow!("missing required parameter #{index}"))
    }

    /// Parameter `index` parsed as `T`.
    ///
    /// # Errors
    ///
    /// Fails when the parameter is missing or does not parse.
    pub fn parse_param<T>(&self, index: usize, what: &str) -> anyhow::Result<T>
    where
        T: std::str::FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        let raw = self.param(index)?;
        raw.trim()
            .parse()
            .with_context(|| format!("invalid {what} '{raw}'"))
    }
}

/// A transform stage.
///
/// `evaluate` returns `Ok(Some(record))` to pass the (possibly modified)
/// record on, `Ok(None)` to filter it out, and `Err` when the record cannot
/// be transformed.
pub trait Transformer: Send + Sync {
    fn name(&self) -> &str;

    /// # Errors
    ///
    /// Any failure; the pipeline diverts the original record as dirty.
    fn evaluate(
        &self,
        record: Record,
        context: &StageContext,
        args: &StageArgs,
    ) -> anyhow::Result<Option<Record>>;

    /// Check parameter shape at bind time.
    ///
    /// # Errors
    ///
    /// Describes the first invalid or missing parameter.
    fn validate(&self, args: &StageArgs) -> anyhow::Result<()> {
        let _ = args;
        Ok(())
    }

    /// A per-binding instance, for stages that keep state or pre-compile
    /// their parameters. `None` shares this transformer.
    ///
    /// # Errors
    ///
    /// Fails when the binding cannot be prepared.
    fn instantiate(
        &self,
        args: &StageArgs,
        context: &StageContext,
    ) -> anyhow::Result<Option<Arc<dyn Transformer>>> {
        let _ = (args, context);
        Ok(None)
    }

    /// The scope this transformer must run in, if it owns one.
    fn scope(&self) -> Option<Arc<IsolationScope>> {
        None
    }
}

impl std::fmt::Debug for dyn Transformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transformer")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}
