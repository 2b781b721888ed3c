//! `dx_script`: an inline WebAssembly stage.
//!
//! The first parameter is the module source (WAT or binary text); the rest
//! are handed to the guest's `rx_configure`. Each binding compiles its
//! source into a private scope whose parent is the host scope, so a script
//! can call into shared archives but never sees other plugins.

use std::sync::Arc;

use anyhow::{bail, Context};
use relaybyte_runtime::PluginLoader;
use relaybyte_types::Record;

use crate::transform::wasm::WasmTransformer;
use crate::transform::{StageArgs, StageContext, Transformer, SCRIPT_STAGE};

/// Entry function every script must export.
pub const SCRIPT_ENTRY: &str = "evaluate";

pub struct ScriptTransformer {
    loader: Arc<PluginLoader>,
}

impl ScriptTransformer {
    #[must_use]
    pub fn new(loader: Arc<PluginLoader>) -> Self {
        Self { loader }
    }
}

fn source(args: &StageArgs) -> anyhow::Result<&str> {
    match args.params.first() {
        Some(code) if !code.trim().is_empty() => Ok(code),
        _ => bail!("missing module source (`code` or `code_file`)"),
    }
}

impl Transformer for ScriptTransformer {
    fn name(&self) -> &str {
        SCRIPT_STAGE
    }

    fn evaluate(
        &self,
        _record: Record,
        _context: &StageContext,
        _args: &StageArgs,
    ) -> anyhow::Result<Option<Record>> {
        bail!("{SCRIPT_STAGE} must be bound before it can evaluate records")
    }

    fn validate(&self, args: &StageArgs) -> anyhow::Result<()> {
        source(args).map(|_| ())
    }

    fn instantiate(
        &self,
        args: &StageArgs,
        context: &StageContext,
    ) -> anyhow::Result<Option<Arc<dyn Transformer>>> {
        let code = source(args)?;
        let scope = self
            .loader
            .inline_scope(SCRIPT_STAGE, code.as_bytes())
            .context("Failed to compile script")?;
        if !scope.defines(SCRIPT_ENTRY) {
            bail!("script does not export `{SCRIPT_ENTRY}`");
        }
        let guest_args = StageArgs::new(args.column_index, args.params[1..].to_vec());
        let stage = WasmTransformer::new(SCRIPT_STAGE, SCRIPT_ENTRY, self.loader.limits())
            .with_scope(scope)
            .bind(&guest_args, context)?;
        Ok(Some(Arc::new(stage)))
    }
}

impl std::fmt::Debug for ScriptTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptTransformer").finish_non_exhaustive()
    }
}
