//! Transform stages backed by a WebAssembly guest.
//!
//! The entry symbol is resolved through the calling thread's active scope
//! on first use, so the stage must run under its binding's scope guard.
//! Each binding owns one guest instance; the record crosses the boundary
//! as JSON.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use parking_lot::Mutex;
use relaybyte_runtime::{scope, GuestInstance, GuestLimits, GuestOutcome, IsolationScope};
use relaybyte_types::Record;

use crate::transform::{StageArgs, StageContext, Transformer};

pub struct WasmTransformer {
    name: String,
    entry: String,
    limits: GuestLimits,
    scope: Option<Arc<IsolationScope>>,
    config: Option<Vec<u8>>,
    instance: Mutex<Option<GuestInstance>>,
}

impl WasmTransformer {
    #[must_use]
    pub fn new(name: &str, entry: &str, limits: GuestLimits) -> Self {
        Self {
            name: name.to_string(),
            entry: entry.to_string(),
            limits,
            scope: None,
            config: None,
            instance: Mutex::new(None),
        }
    }

    /// Pin the stage to a private scope instead of a registry-provided one.
    #[must_use]
    pub fn with_scope(mut self, scope: Arc<IsolationScope>) -> Self {
        self.scope = Some(scope);
        self
    }

    #[must_use]
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// A fresh, unstarted instance for one binding, carrying its
    /// configuration payload.
    ///
    /// # Errors
    ///
    /// Fails if the context cannot be serialized.
    pub fn bind(&self, args: &StageArgs, context: &StageContext) -> anyhow::Result<Self> {
        let payload = serde_json::to_vec(&serde_json::json!({
            "column_index": args.column_index,
            "params": args.params,
            "context": context,
        }))
        .context("Failed to encode stage configuration")?;
        Ok(Self {
            name: self.name.clone(),
            entry: self.entry.clone(),
            limits: self.limits,
            scope: self.scope.clone(),
            config: Some(payload),
            instance: Mutex::new(None),
        })
    }

    fn start(&self) -> anyhow::Result<GuestInstance> {
        let resolved = scope::resolve_current(&self.entry)?;
        let mut guest = GuestInstance::instantiate(&resolved, &self.limits)?;
        if let Some(payload) = &self.config {
            guest.configure(payload)?;
        }
        tracing::debug!(
            stage = self.name.as_str(),
            entry = self.entry.as_str(),
            scope = resolved.scope_name.as_str(),
            "Started guest stage"
        );
        Ok(guest)
    }
}

impl Transformer for WasmTransformer {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(
        &self,
        record: Record,
        _context: &StageContext,
        _args: &StageArgs,
    ) -> anyhow::Result<Option<Record>> {
        let mut slot = self.instance.lock();
        if slot.is_none() {
            *slot = Some(self.start()?);
        }
        let Some(guest) = slot.as_mut() else {
            return Err(anyhow!("guest stage {} is not running", self.name));
        };

        let input = serde_json::to_vec(&record).context("Failed to encode record")?;
        match guest.call(&input)? {
            GuestOutcome::Output(bytes) => {
                let output: Record =
                    serde_json::from_slice(&bytes).context("Guest returned an invalid record")?;
                Ok(Some(output))
            }
            GuestOutcome::Filtered => Ok(None),
            GuestOutcome::Failed(message) => Err(anyhow!(message)),
        }
    }

    fn instantiate(
        &self,
        args: &StageArgs,
        context: &StageContext,
    ) -> anyhow::Result<Option<Arc<dyn Transformer>>> {
        Ok(Some(Arc::new(self.bind(args, context)?)))
    }

    fn scope(&self) -> Option<Arc<IsolationScope>> {
        self.scope.clone()
    }
}

impl std::fmt::Debug for WasmTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmTransformer")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .field("scope", &self.scope.as_ref().map(|s| s.name()))
            .field("started", &self.instance.lock().is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaybyte_runtime::ScopeGuard;
    use relaybyte_types::Column;
    use wasmtime::Engine;

    // Returns a fixed one-column record for every input.
    const CONSTANT: &str = r#"(module
        (memory (export "memory") 1)
        (data (i32.const 64) "[{\"type\":\"long\",\"value\":7}]")
        (func (export "rx_alloc") (param i32) (result i32) i32.const 1024)
        (func (export "evaluate") (param i32 i32) (result i64)
            i64.const 274877906971))"#;

    fn scope() -> Arc<IsolationScope> {
        let engine = Engine::default();
        Arc::new(IsolationScope::inline(&engine, "constant", CONSTANT.as_bytes(), None).unwrap())
    }

    #[test]
    fn needs_an_active_scope() {
        let stage = WasmTransformer::new("constant", "evaluate", GuestLimits::default());
        let err = stage
            .evaluate(Record::new(), &StageContext::new(), &StageArgs::default())
            .unwrap_err();
        assert!(err.to_string().contains("no active plugin scope"));
    }

    #[test]
    fn runs_inside_the_active_scope() {
        let scope = scope();
        let stage = WasmTransformer::new("constant", "evaluate", GuestLimits::default());
        let _guard = ScopeGuard::enter(Arc::clone(&scope));
        let out = stage
            .evaluate(
                Record::from_columns(vec![Column::from("x")]),
                &StageContext::new(),
                &StageArgs::default(),
            )
            .unwrap()
            .unwrap();
        assert_eq!(out.columns(), &[Column::Long(7)]);
    }

    #[test]
    fn bind_keeps_private_scope() {
        let scope = scope();
        let template = WasmTransformer::new("constant", "evaluate", GuestLimits::default())
            .with_scope(Arc::clone(&scope));
        let bound = template
            .instantiate(&StageArgs::default(), &StageContext::new())
            .unwrap()
            .unwrap();
        assert_eq!(bound.scope().unwrap().name(), "constant");
    }
}
