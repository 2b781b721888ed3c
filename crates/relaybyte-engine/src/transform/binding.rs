//! Stage bindings: a transformer plus its configured arguments.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Context;
use relaybyte_runtime::IsolationScope;
use relaybyte_types::Record;

use crate::config::TransformerSpec;
use crate::error::{EngineError, Result};
use crate::transform::registry::{TransformerRegistry, BUILTIN_PREFIX};
use crate::transform::{StageArgs, StageContext, Transformer, SCRIPT_STAGE};

/// One configured stage of a pipeline.
pub struct StageBinding {
    name: String,
    transformer: Arc<dyn Transformer>,
    args: StageArgs,
    context: StageContext,
    scope: Option<Arc<IsolationScope>>,
    column_checked: bool,
}

impl StageBinding {
    #[must_use]
    pub fn new(name: impl Into<String>, transformer: Arc<dyn Transformer>, args: StageArgs) -> Self {
        Self {
            name: name.into(),
            transformer,
            args,
            context: StageContext::new(),
            scope: None,
            column_checked: false,
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: StageContext) -> Self {
        self.context = context;
        self
    }

    /// Run the stage with `scope` as the thread's active scope.
    #[must_use]
    pub fn with_scope(mut self, scope: Option<Arc<IsolationScope>>) -> Self {
        self.scope = scope;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn transformer(&self) -> &Arc<dyn Transformer> {
        &self.transformer
    }

    #[must_use]
    pub fn args(&self) -> &StageArgs {
        &self.args
    }

    #[must_use]
    pub fn context(&self) -> &StageContext {
        &self.context
    }

    #[must_use]
    pub fn scope(&self) -> Option<&Arc<IsolationScope>> {
        self.scope.as_ref()
    }

    /// Validate the target column against the first record seen.
    pub(crate) fn check_column(&mut self, record: &Record) -> Result<()> {
        if self.column_checked {
            return Ok(());
        }
        if let Some(index) = self.args.column_index {
            let count = record.column_count();
            if index >= count {
                return Err(EngineError::config(format!(
                    "column index[{index}] out of bound[{count}]. name={}",
                    self.name
                )));
            }
        }
        self.column_checked = true;
        Ok(())
    }
}

impl std::fmt::Debug for StageBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageBinding")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("scope", &self.scope.as_ref().map(|s| s.name()))
            .finish_non_exhaustive()
    }
}

fn stage_args(spec: &TransformerSpec) -> Result<StageArgs> {
    if spec.name != SCRIPT_STAGE {
        return Ok(StageArgs::new(spec.column_index, spec.params.clone()));
    }
    let code = match (&spec.code, &spec.code_file) {
        (Some(code), _) => code.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script file: {}", path.display()))?,
        (None, None) => {
            return Err(EngineError::config(format!(
                "{SCRIPT_STAGE} requires `code` or `code_file`"
            )))
        }
    };
    let mut params = Vec::with_capacity(spec.params.len() + 1);
    params.push(code);
    params.extend(spec.params.iter().cloned());
    Ok(StageArgs::new(spec.column_index, params))
}

/// Turn configured stage specs into bindings, loading any external stage
/// the registry does not know yet.
///
/// # Errors
///
/// Returns [`EngineError::Config`](crate::error::EngineError::Config) for
/// an unknown stage, a second script stage, invalid parameters or a script
/// that does not compile.
pub fn build_stages(
    specs: &[TransformerSpec],
    registry: &TransformerRegistry,
) -> Result<Vec<StageBinding>> {
    let scripts = specs.iter().filter(|s| s.name == SCRIPT_STAGE).count();
    if scripts > 1 {
        return Err(EngineError::config(format!(
            "{SCRIPT_STAGE} may be configured at most once, found {scripts}"
        )));
    }

    let missing: BTreeSet<&str> = specs
        .iter()
        .map(|s| s.name.as_str())
        .filter(|name| !name.starts_with(BUILTIN_PREFIX) && !registry.contains(name))
        .collect();
    for name in missing {
        registry.load_local(name).map_err(|e| {
            EngineError::config(format!(
                "transformer '{name}' is not registered and could not be loaded: {e}"
            ))
        })?;
    }

    let mut stages = Vec::with_capacity(specs.len());
    for spec in specs {
        let name = spec.name.as_str();
        let Some(entry) = registry.get(name) else {
            return Err(EngineError::config(format!(
                "transformer '{name}' is not registered"
            )));
        };
        let args = stage_args(spec)?;
        entry
            .transformer
            .validate(&args)
            .map_err(|e| EngineError::config(format!("transformer({name}): {e:#}")))?;
        let instance = entry
            .transformer
            .instantiate(&args, &spec.context)
            .map_err(|e| EngineError::config(format!("transformer({name}): {e:#}")))?;
        let transformer = instance.unwrap_or_else(|| Arc::clone(&entry.transformer));
        let scope = transformer.scope().or(entry.scope);
        tracing::debug!(
            stage = name,
            column = ?args.column_index,
            params = args.params.len(),
            scoped = scope.is_some(),
            "Bound transform stage"
        );
        stages.push(
            StageBinding::new(name, transformer, args)
                .with_context(spec.context.clone())
                .with_scope(scope),
        );
    }
    Ok(stages)
}
