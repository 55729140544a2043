//! The device's pending-changes buffer and the guard that decides its fate.

use tracing::{debug, info, warn};

use crate::error::{DeviceError, Operation, ReconcileError};

/// Authenticated connection to one device.
///
/// Mutations issued through configurators accumulate in the device's
/// pending-changes buffer until they are committed or rolled back.
pub trait DeviceSession {
    fn has_pending_changes(&mut self) -> Result<bool, DeviceError>;
    fn commit(&mut self) -> Result<(), DeviceError>;
    fn rollback(&mut self) -> Result<(), DeviceError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitPolicy {
    /// Roll back uncommitted changes when the invocation fails.
    pub revert_on_error: bool,
    /// Only commit when this invocation issued a mutation, even if the
    /// device has other pending changes.
    pub write_on_change: bool,
}

/// Scoped hold on a session for the duration of one invocation.
///
/// Every path ends in [`Transaction::commit`] or [`Transaction::abort`]. A
/// guard dropped without either rolls back when `revert_on_error` is set.
pub struct Transaction<'s, S: DeviceSession + ?Sized> {
    session: &'s mut S,
    policy: CommitPolicy,
    object: String,
    mutations: usize,
    settled: bool,
}

impl<'s, S: DeviceSession + ?Sized> Transaction<'s, S> {
    pub fn begin(session: &'s mut S, policy: CommitPolicy, object: impl ToString) -> Self {
        Transaction {
            session,
            policy,
            object: object.to_string(),
            mutations: 0,
            settled: false,
        }
    }

    /// Count a mutation call that reached the device, whether or not it succeeded.
    pub fn record_mutation(&mut self) {
        self.mutations += 1;
    }

    /// Commit according to the policy. Returns whether a commit was issued.
    pub fn commit(mut self) -> Result<bool, ReconcileError> {
        self.settled = true;
        let needed = if self.mutations > 0 {
            true
        } else if self.policy.write_on_change {
            false
        } else {
            match self.session.has_pending_changes() {
                Ok(pending) => pending,
                Err(e) => {
                    let error = ReconcileError::device(e, Operation::PendingCheck, &self.object);
                    return Err(self.revert(error));
                }
            }
        };
        if !needed {
            debug!(object = %self.object, "nothing to commit");
            return Ok(false);
        }
        match self.session.commit() {
            Ok(()) => {
                info!(object = %self.object, mutations = self.mutations, "committed");
                Ok(true)
            }
            Err(e) => {
                let error = ReconcileError::device(e, Operation::Commit, &self.object);
                Err(self.revert(error))
            }
        }
    }

    /// Settle after a failure: roll back if the policy asks for it, and
    /// return the error to propagate.
    pub fn abort(mut self, error: ReconcileError) -> ReconcileError {
        self.settled = true;
        self.revert(error)
    }

    fn revert(&mut self, error: ReconcileError) -> ReconcileError {
        if !self.policy.revert_on_error {
            return error;
        }
        warn!(object = %self.object, %error, "rolling back uncommitted changes");
        match self.session.rollback() {
            Ok(()) => error,
            Err(e) => {
                warn!(object = %self.object, error = %e, "rollback failed");
                ReconcileError::RollbackFailed {
                    error: Box::new(error),
                    rollback: Box::new(e),
                }
            }
        }
    }
}

impl<S: DeviceSession + ?Sized> Drop for Transaction<'_, S> {
    fn drop(&mut self) {
        if self.settled || !self.policy.revert_on_error {
            return;
        }
        warn!(object = %self.object, "transaction dropped without a decision, rolling back");
        if let Err(e) = self.session.rollback() {
            warn!(object = %self.object, error = %e, "rollback failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Fail, MockDevice};

    fn policy(revert_on_error: bool, write_on_change: bool) -> CommitPolicy {
        CommitPolicy {
            revert_on_error,
            write_on_change,
        }
    }

    #[test]
    fn test_commit_after_mutation() {
        for write_on_change in [false, true] {
            let device = MockDevice::new();
            let mut session = device.session();
            let mut tx = Transaction::begin(&mut session, policy(false, write_on_change), "x");
            tx.record_mutation();
            assert!(tx.commit().unwrap());
            assert_eq!(device.state().commits, 1);
        }
    }

    #[test]
    fn test_pending_without_mutation() {
        // foreign pending changes are committed unless write_on_change is set
        for (write_on_change, expected) in [(false, true), (true, false)] {
            let device = MockDevice::new();
            device.state_mut().pending = true;
            let mut session = device.session();
            let tx = Transaction::begin(&mut session, policy(false, write_on_change), "x");
            assert_eq!(tx.commit().unwrap(), expected);
            assert_eq!(device.state().commits, usize::from(expected));
        }
    }

    #[test]
    fn test_nothing_pending() {
        let device = MockDevice::new();
        let mut session = device.session();
        let tx = Transaction::begin(&mut session, policy(false, false), "x");
        assert!(!tx.commit().unwrap());
        assert_eq!(device.state().commits, 0);
    }

    #[test]
    fn test_commit_failure_reverts() {
        let device = MockDevice::new();
        device.fail(Operation::Commit, Fail::Reject);
        let mut session = device.session();
        let mut tx = Transaction::begin(&mut session, policy(true, false), "x");
        tx.record_mutation();
        let err = tx.commit().unwrap_err();
        assert_eq!(err.kind(), "RemoteOperationError");
        assert_eq!(device.state().rollbacks, 1);
    }

    #[test]
    fn test_abort_respects_policy() {
        for revert in [false, true] {
            let device = MockDevice::new();
            let mut session = device.session();
            let tx = Transaction::begin(&mut session, policy(revert, false), "x");
            let err = tx.abort(ReconcileError::AppendOnAbsentParent {
                object: "x".to_string(),
            });
            assert_eq!(err.kind(), "AppendOnAbsentParentError");
            assert_eq!(device.state().rollbacks, usize::from(revert));
        }
    }

    #[test]
    fn test_failed_rollback_keeps_original_error() {
        let device = MockDevice::new();
        device.fail(Operation::Rollback, Fail::Unreachable);
        let mut session = device.session();
        let tx = Transaction::begin(&mut session, policy(true, false), "x");
        let err = tx.abort(ReconcileError::AppendOnAbsentParent {
            object: "x".to_string(),
        });
        assert!(matches!(err, ReconcileError::RollbackFailed { .. }));
        assert_eq!(err.kind(), "AppendOnAbsentParentError");
    }

    #[test]
    fn test_drop_rolls_back() {
        let device = MockDevice::new();
        {
            let mut session = device.session();
            let mut tx = Transaction::begin(&mut session, policy(true, false), "x");
            tx.record_mutation();
        }
        assert_eq!(device.state().rollbacks, 1);
        assert_eq!(device.state().commits, 0);
    }
}
