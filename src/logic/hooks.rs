use log::{debug, error};

use crate::error::ApiError;
use crate::model::{HookError, HookKind, Scope, ScopeValue};

/// Runs the hook of `kind` once per resource held by the scope. Models that
/// do not declare the hook are left untouched. The scope must hold a value.
pub fn dispatch(kind: HookKind, scope: &mut Scope) -> Result<(), ApiError> {
    if scope.value == ScopeValue::Empty {
        error!(
            "Hook {:?} dispatched on scope of {} with no value",
            kind,
            scope.collection()
        );
        return Err(ApiError::internal());
    }

    let Some(hook) = scope.model().hooks().get(kind) else {
        debug!("{} does not implement {:?}", scope.collection(), kind);
        return Ok(());
    };

    // The hook gets the scope and the resource at once, so the value is
    // detached for the duration of the calls.
    let mut value = std::mem::take(&mut scope.value);
    let result = match &mut value {
        ScopeValue::Single(resource) => hook(scope, resource),
        ScopeValue::Many(resources) => resources
            .iter_mut()
            .try_for_each(|resource| hook(scope, resource)),
        ScopeValue::Empty => Ok(()),
    };
    // A hook that replaced the value wins over the detached one.
    if scope.value == ScopeValue::Empty {
        scope.value = value;
    }

    result.map_err(|err| match err {
        HookError::Api(api) => api,
        HookError::Other(other) => {
            error!(
                "Hook {:?} of {} failed: {:#}",
                kind,
                scope.collection(),
                other
            );
            ApiError::internal()
        }
    })
}
