//! Caller-owned transactional session state.

use crate::error::ObjectControllerError;
use crate::storage_api::SessionHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Idle,
    Open(SessionHandle),
    Committed,
    Aborted,
}

/// At most one open backend session per unit of work.
///
/// `Idle -> Open -> Committed | Aborted`; a finished session may be opened again.
/// The open handle is passed explicitly in each mutating call's options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionalSession {
    state: SessionState,
}

impl Default for TransactionalSession {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionalSession {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
        }
    }

    /// The open handle, if any.
    #[must_use]
    pub fn handle(&self) -> Option<SessionHandle> {
        match self.state {
            SessionState::Open(handle) => Some(handle),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.handle().is_some()
    }

    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.state == SessionState::Committed
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.state == SessionState::Aborted
    }

    /// Fails when a session is already open.
    ///
    /// # Errors
    /// `InvalidTransactionState` if a session is open.
    pub fn ensure_can_begin(&self) -> Result<(), ObjectControllerError> {
        if self.is_open() {
            return Err(ObjectControllerError::InvalidTransactionState(
                "a transactional session is already open".to_owned(),
            ));
        }
        Ok(())
    }

    /// # Errors
    /// `InvalidTransactionState` if a session is already open.
    pub fn begin(&mut self, handle: SessionHandle) -> Result<(), ObjectControllerError> {
        self.ensure_can_begin()?;
        self.state = SessionState::Open(handle);
        Ok(())
    }

    /// Handle to finish; fails when nothing is open.
    ///
    /// # Errors
    /// `InvalidTransactionState` if no session is open.
    pub fn open_handle(&self, action: &str) -> Result<SessionHandle, ObjectControllerError> {
        self.handle().ok_or_else(|| {
            ObjectControllerError::InvalidTransactionState(format!(
                "there is no transactional session to {action}"
            ))
        })
    }

    pub fn mark_committed(&mut self) {
        self.state = SessionState::Committed;
    }

    pub fn mark_aborted(&mut self) {
        self.state = SessionState::Aborted;
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn lifecycle() {
        let mut session = TransactionalSession::new();
        assert!(session.open_handle("commit").is_err());

        let handle = SessionHandle::new();
        session.begin(handle).unwrap();
        assert_eq!(session.handle(), Some(handle));
        assert!(matches!(
            session.begin(SessionHandle::new()),
            Err(ObjectControllerError::InvalidTransactionState(_))
        ));

        assert_eq!(session.open_handle("commit").unwrap(), handle);
        session.mark_committed();
        assert!(session.is_committed());
        assert!(session.handle().is_none());

        let err = session.open_handle("abort").unwrap_err();
        assert_eq!(
            err,
            ObjectControllerError::InvalidTransactionState(
                "there is no transactional session to abort".to_owned()
            )
        );

        session.begin(SessionHandle::new()).unwrap();
        session.mark_aborted();
        assert!(session.is_aborted());
    }
}
