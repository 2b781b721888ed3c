//! Guest instances and the linear-memory calling convention.
//!
//! A guest stage module exports:
//!
//! - `memory`
//! - `rx_alloc(len: i32) -> i32`, returning a pointer to `len` writable bytes
//! - its entry function `(ptr: i32, len: i32) -> i64`
//!
//! and optionally `rx_configure(ptr: i32, len: i32) -> i32` and
//! `rx_last_error() -> i64`. The host writes the input JSON through
//! `rx_alloc`, calls the entry, and interprets the result: `0` means the
//! record was filtered, a negative value is a failure, anything else is a
//! packed `(ptr << 32) | len` pointing at the output JSON.
//!
//! Guests may import `env.rx_log(level, ptr, len)` to log through the host.

use anyhow::Context;
use wasmtime::{Caller, Extern, Instance, Linker, Memory, Store, StoreLimits, TypedFunc};

use crate::error::{PluginError, Result};
use crate::limits::GuestLimits;
use crate::scope::{self, ResolvedSymbol};

pub const ALLOC_EXPORT: &str = "rx_alloc";
pub const CONFIGURE_EXPORT: &str = "rx_configure";
pub const LAST_ERROR_EXPORT: &str = "rx_last_error";
pub const LOG_IMPORT: &str = "rx_log";

/// Per-store host state.
pub struct GuestState {
    scope_name: String,
    limits: StoreLimits,
}

/// Result of one guest call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuestOutcome {
    Output(Vec<u8>),
    Filtered,
    Failed(String),
}

/// A live instance of a resolved guest entry point.
pub struct GuestInstance {
    store: Store<GuestState>,
    instance: Instance,
    memory: Memory,
    alloc: TypedFunc<i32, i32>,
    entry: TypedFunc<(i32, i32), i64>,
    symbol: String,
}

impl GuestInstance {
    /// Instantiate the module defining `resolved` in a fresh store.
    ///
    /// # Errors
    ///
    /// Returns an error if instantiation traps or the module lacks the
    /// required exports.
    pub fn instantiate(resolved: &ResolvedSymbol, limits: &GuestLimits) -> Result<Self> {
        let engine = resolved.module.engine();
        let mut store = Store::new(
            engine,
            GuestState {
                scope_name: resolved.scope_name.clone(),
                limits: limits.store_limits(),
            },
        );
        store.limiter(|state| &mut state.limits);

        let mut linker: Linker<GuestState> = Linker::new(engine);
        linker
            .func_wrap("env", LOG_IMPORT, host_log)
            .context("Failed to register rx_log")?;

        let instance = linker
            .instantiate(&mut store, &resolved.module)
            .with_context(|| format!("Failed to instantiate {}", resolved.archive.display()))?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| PluginError::Protocol("guest has no exported 'memory'".into()))?;
        let alloc = instance
            .get_typed_func::<i32, i32>(&mut store, ALLOC_EXPORT)
            .with_context(|| format!("Guest is missing '{ALLOC_EXPORT}'"))?;
        let entry = instance
            .get_typed_func::<(i32, i32), i64>(&mut store, &resolved.symbol)
            .with_context(|| format!("Guest entry '{}' has the wrong shape", resolved.symbol))?;

        Ok(Self {
            store,
            instance,
            memory,
            alloc,
            entry,
            symbol: resolved.symbol.clone(),
        })
    }

    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Hand configuration bytes to the guest if it exports `rx_configure`.
    /// Returns whether the guest accepted a configuration call.
    ///
    /// # Errors
    ///
    /// Returns an error if the guest traps or reports a non-zero status.
    pub fn configure(&mut self, payload: &[u8]) -> Result<bool> {
        let Ok(configure) = self
            .instance
            .get_typed_func::<(i32, i32), i32>(&mut self.store, CONFIGURE_EXPORT)
        else {
            return Ok(false);
        };
        let (ptr, len) = self.write(payload)?;
        let status = configure
            .call(&mut self.store, (ptr, len))
            .context("Guest rx_configure trapped")?;
        if status != 0 {
            let message = self.last_error().unwrap_or_default();
            return Err(PluginError::Protocol(format!(
                "rx_configure returned {status}: {message}"
            )));
        }
        Ok(true)
    }

    /// Call the entry function with `input`.
    ///
    /// # Errors
    ///
    /// Returns an error if the guest traps or returns an out-of-bounds
    /// result. Guest-reported failures come back as
    /// [`GuestOutcome::Failed`].
    pub fn call(&mut self, input: &[u8]) -> Result<GuestOutcome> {
        let (ptr, len) = self.write(input)?;
        let packed = self
            .entry
            .call(&mut self.store, (ptr, len))
            .with_context(|| format!("Guest '{}' trapped", self.symbol))?;

        if packed == 0 {
            return Ok(GuestOutcome::Filtered);
        }
        if packed < 0 {
            let message = self
                .last_error()
                .unwrap_or_else(|| format!("guest returned error code {packed}"));
            return Ok(GuestOutcome::Failed(message));
        }
        let (out_ptr, out_len) = unpack_ptr_len(packed);
        Ok(GuestOutcome::Output(self.read(out_ptr, out_len)?))
    }

    fn write(&mut self, data: &[u8]) -> Result<(i32, i32)> {
        let len = i32::try_from(data.len())
            .map_err(|_| PluginError::Protocol(format!("payload too large: {}", data.len())))?;
        let ptr = self
            .alloc
            .call(&mut self.store, len)
            .context("Guest rx_alloc trapped")?;
        if ptr <= 0 {
            return Err(PluginError::Protocol("rx_alloc returned null pointer".into()));
        }
        let offset = usize::try_from(ptr)
            .map_err(|_| PluginError::Protocol(format!("invalid guest pointer {ptr}")))?;
        self.memory
            .write(&mut self.store, offset, data)
            .context("Failed to write into guest memory")?;
        Ok((ptr, len))
    }

    /// Copy `ptr..ptr + len` out of guest memory. The range is checked
    /// against the memory's current size before anything is allocated.
    fn read(&self, ptr: u32, len: u32) -> Result<Vec<u8>> {
        let start = ptr as usize;
        let data = self.memory.data(&self.store);
        start
            .checked_add(len as usize)
            .and_then(|end| data.get(start..end))
            .map(<[u8]>::to_vec)
            .ok_or_else(|| {
                PluginError::Protocol(format!(
                    "guest result {start}+{len} lies outside its memory ({} bytes)",
                    data.len()
                ))
            })
    }

    fn last_error(&mut self) -> Option<String> {
        let func = self
            .instance
            .get_typed_func::<(), i64>(&mut self.store, LAST_ERROR_EXPORT)
            .ok()?;
        let packed = func.call(&mut self.store, ()).ok()?;
        if packed <= 0 {
            return None;
        }
        let (ptr, len) = unpack_ptr_len(packed);
        let bytes = self.read(ptr, len).ok()?;
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Pack a guest pointer and length into one `i64`.
#[must_use]
pub fn pack_ptr_len(ptr: u32, len: u32) -> i64 {
    (i64::from(ptr) << 32) | i64::from(len)
}

/// Split a packed `i64` into pointer and length.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn unpack_ptr_len(packed: i64) -> (u32, u32) {
    ((packed >> 32) as u32, (packed & 0xFFFF_FFFF) as u32)
}

#[allow(clippy::needless_pass_by_value)]
fn host_log(mut caller: Caller<'_, GuestState>, level: i32, ptr: i32, len: i32) {
    let Some(memory) = caller.get_export("memory").and_then(Extern::into_memory) else {
        return;
    };
    let (Ok(start), Ok(len)) = (usize::try_from(ptr), usize::try_from(len)) else {
        return;
    };
    let data = memory.data(&caller);
    let Some(bytes) = data.get(start..start.saturating_add(len)) else {
        return;
    };
    let msg = String::from_utf8_lossy(bytes);
    let active = scope::current();
    let plugin = active
        .as_deref()
        .map_or(caller.data().scope_name.as_str(), |s| s.name());

    match level {
        0 => tracing::error!(plugin, "[guest] {}", msg),
        1 => tracing::warn!(plugin, "[guest] {}", msg),
        2 => tracing::info!(plugin, "[guest] {}", msg),
        3 => tracing::debug!(plugin, "[guest] {}", msg),
        _ => tracing::trace!(plugin, "[guest] {}", msg),
    }
}
