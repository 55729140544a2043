//! One invocation, from parameters to outcome.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, info_span};

use crate::applier::apply;
use crate::catalog::ObjectCatalog;
use crate::configurator::ObjectConfigurator;
use crate::error::{Operation, ReconcileError, ValidationError};
use crate::mode::Mode;
use crate::object::{DesiredObject, ObjectKey};
use crate::resolver::resolve;
use crate::session::{CommitPolicy, DeviceSession, Transaction};

pub const STATUS_DEPLOYED: &str = "object deployed successfully";
pub const STATUS_REMOVED: &str = "object removed successfully";
pub const STATUS_READ: &str = "object read successfully";
pub const STATUS_NOT_FOUND: &str = "object not found";
pub const STATUS_UNCHANGED: &str = "no changes required";
pub const STATUS_WOULD_CHANGE: &str = "changes required, not applied (dry run)";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Invocation {
    pub state: Mode,
    /// The desired object, in parameter format.
    pub parameters: Value,
    pub revert_on_error: bool,
    pub write_on_change: bool,
    /// Stop after resolving; issue no mutation, commit or rollback.
    pub dry_run: bool,
}

impl Invocation {
    pub fn new(state: Mode, parameters: Value) -> Self {
        Invocation {
            state,
            parameters,
            ..Default::default()
        }
    }

    pub fn policy(&self) -> CommitPolicy {
        CommitPolicy {
            revert_on_error: self.revert_on_error,
            write_on_change: self.write_on_change,
        }
    }
}

/// Result of a successful invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    changed: bool,
    obj: Option<Value>,
    status: &'static str,
}

impl Outcome {
    fn new(changed: bool, obj: Option<Value>, status: &'static str) -> Self {
        Outcome {
            changed,
            obj,
            status,
        }
    }

    pub fn changed(&self) -> bool {
        self.changed
    }

    /// The object in parameter format, `None` when it does not exist.
    pub fn object(&self) -> Option<&Value> {
        self.obj.as_ref()
    }

    pub fn status(&self) -> &str {
        self.status
    }
}

/// Drive the object named by `invocation` towards its desired state.
///
/// The actual object is always read first. Validation failures happen before
/// any device call; failures after a mutation roll back when the invocation
/// asks for `revert_on_error`.
pub fn execute<C, S>(
    invocation: &Invocation,
    configurator: &mut C,
    session: &mut S,
) -> Result<Outcome, ReconcileError>
where
    C: ObjectConfigurator + ?Sized,
    S: DeviceSession + ?Sized,
{
    let catalog = configurator.catalog();
    let span = info_span!("reconcile", object_type = catalog.object_type, state = %invocation.state);
    let _enter = span.enter();

    if invocation.state == Mode::Read {
        return read(catalog, &invocation.parameters, configurator);
    }

    let desired = DesiredObject::from_parameters(catalog, &invocation.parameters)?;
    let key = desired.key();
    let actual = configurator
        .read(key)
        .map_err(|e| ReconcileError::device(e, Operation::Read, key))?;

    let action = resolve(invocation.state, &desired, actual.as_ref())?;

    if invocation.dry_run {
        info!(%action, object = %key, "dry run, not applying");
        let changed = action.is_mutation();
        let status = if changed {
            STATUS_WOULD_CHANGE
        } else {
            STATUS_UNCHANGED
        };
        return Ok(Outcome::new(
            changed,
            actual.map(|a| a.to_parameters(catalog)),
            status,
        ));
    }

    let mut tx = Transaction::begin(session, invocation.policy(), key);
    let applied = match apply(&action, actual, configurator, &mut tx) {
        Ok(applied) => applied,
        Err(error) => return Err(tx.abort(error)),
    };
    tx.commit()?;

    let status = match (applied.changed, invocation.state) {
        (false, _) => STATUS_UNCHANGED,
        (true, Mode::Absent) => STATUS_REMOVED,
        (true, _) => STATUS_DEPLOYED,
    };
    info!(%action, changed = applied.changed, status, "done");
    Ok(Outcome::new(
        applied.changed,
        applied.object.map(|a| a.to_parameters(catalog)),
        status,
    ))
}

/// Report the actual object. Only the key is taken from `parameters`; the
/// rest is not validated, so a previous read's output can be passed back.
fn read<C>(
    catalog: &'static ObjectCatalog,
    parameters: &Value,
    configurator: &mut C,
) -> Result<Outcome, ReconcileError>
where
    C: ObjectConfigurator + ?Sized,
{
    let parameters = parameters
        .as_object()
        .ok_or_else(|| ValidationError::NotAnObject {
            object_type: catalog.object_type.to_string(),
        })?;
    let key = ObjectKey::from_parameters(catalog, parameters)?;
    let actual = configurator
        .read(&key)
        .map_err(|e| ReconcileError::device(e, Operation::Read, &key))?;
    Ok(match actual {
        Some(actual) => Outcome::new(false, Some(actual.to_parameters(catalog)), STATUS_READ),
        None => Outcome::new(false, None, STATUS_NOT_FOUND),
    })
}
