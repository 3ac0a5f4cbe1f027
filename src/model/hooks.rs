use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::error::ApiError;
use crate::model::{Resource, Scope};

/// Lifecycle points a resource type may opt into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    BeforeCreate,
    AfterCreate,
    BeforeRead,
    AfterRead,
    BeforePatch,
    AfterPatch,
    BeforeDelete,
    AfterDelete,
}

/// Error returned by a hook. `Api` errors reach the caller verbatim,
/// anything else is reported as an internal error.
#[derive(Debug, Error)]
pub enum HookError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type HookFn =
    Arc<dyn Fn(&mut Scope, &mut Resource) -> Result<(), HookError> + Send + Sync>;

/// Wraps a closure as a [`HookFn`].
pub fn hook_fn<F>(hook: F) -> HookFn
where
    F: Fn(&mut Scope, &mut Resource) -> Result<(), HookError> + Send + Sync + 'static,
{
    Arc::new(hook)
}

/// Capability table: the hooks a resource type declares.
#[derive(Clone, Default)]
pub struct Hooks {
    table: HashMap<HookKind, HookFn>,
}

impl Hooks {
    pub fn insert(&mut self, kind: HookKind, hook: HookFn) {
        self.table.insert(kind, hook);
    }

    pub fn implements(&self, kind: HookKind) -> bool {
        self.table.contains_key(&kind)
    }

    pub fn get(&self, kind: HookKind) -> Option<HookFn> {
        self.table.get(&kind).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.table.keys()).finish()
    }
}
