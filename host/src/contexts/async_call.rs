//! Async calls and call groups.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use skein_vm_common::Address;

/// Identifier of the legacy single-call group.
pub const LEGACY_GROUP_ID: &str = "";

/// Lifecycle of one async call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AsyncCallStatus {
    /// Registered, not yet resolved.
    #[default]
    Pending,
    /// The destination executed successfully.
    Resolved,
    /// The destination failed.
    Rejected,
}

/// One registered asynchronous call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AsyncCall {
    /// Unique identifier, assigned at registration.
    pub call_id: Vec<u8>,
    /// Current lifecycle state.
    pub status: AsyncCallStatus,
    /// The called contract.
    pub destination: Address,
    /// Call data in `func@hexarg@…` form.
    pub data: Vec<u8>,
    /// Value sent with the call.
    pub value: BigUint,
    /// Gas forwarded to the destination.
    pub gas_limit: u64,
    /// Gas reserved for the callback; the destination cannot spend it.
    pub gas_locked: u64,
    /// Callback export invoked on success; empty for none.
    pub success_callback: String,
    /// Callback export invoked on failure; empty for none.
    pub error_callback: String,
    /// Opaque bytes handed back to the callback as its closure.
    pub callback_closure: Vec<u8>,
}

impl AsyncCall {
    /// The callback export for the given outcome; `None` when unset.
    pub fn callback_name(&self, success: bool) -> Option<&str> {
        let name = if success {
            self.success_callback.as_str()
        } else {
            self.error_callback.as_str()
        };
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }

    /// True while the call awaits resolution.
    pub fn is_pending(&self) -> bool {
        self.status == AsyncCallStatus::Pending
    }
}

/// A named set of async calls with an optional group callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AsyncCallGroup {
    /// Group identifier; [`LEGACY_GROUP_ID`] for the legacy group.
    pub identifier: String,
    /// Callback export fired when every call in the group resolved.
    pub callback: String,
    /// Data handed to the group callback.
    pub callback_data: Vec<u8>,
    /// The calls of this group, in registration order.
    pub calls: Vec<AsyncCall>,
}

impl AsyncCallGroup {
    /// Creates an empty group.
    pub fn new(identifier: &str) -> Self {
        AsyncCallGroup {
            identifier: identifier.to_string(),
            ..AsyncCallGroup::default()
        }
    }

    /// True if any call in the group is still pending.
    pub fn has_pending_calls(&self) -> bool {
        self.calls.iter().any(AsyncCall::is_pending)
    }

    /// True once every call reached a terminal status.
    pub fn is_complete(&self) -> bool {
        !self.has_pending_calls()
    }

    /// Finds a call by its identifier.
    pub fn find_call_mut(&mut self, call_id: &[u8]) -> Option<&mut AsyncCall> {
        self.calls.iter_mut().find(|call| call.call_id == call_id)
    }

    /// Drops a call by its identifier; true if it existed.
    pub fn remove_call(&mut self, call_id: &[u8]) -> bool {
        let before = self.calls.len();
        self.calls.retain(|call| call.call_id != call_id);
        self.calls.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_name_selection() {
        let call = AsyncCall {
            success_callback: "onSuccess".to_string(),
            error_callback: String::new(),
            ..AsyncCall::default()
        };
        assert_eq!(call.callback_name(true), Some("onSuccess"));
        assert_eq!(call.callback_name(false), None);
    }

    #[test]
    fn test_group_completion() {
        let mut group = AsyncCallGroup::new("swap");
        assert!(group.is_complete());

        group.calls.push(AsyncCall::default());
        assert!(group.has_pending_calls());

        group.calls[0].status = AsyncCallStatus::Resolved;
        assert!(group.is_complete());
    }

    #[test]
    fn test_remove_call() {
        let mut group = AsyncCallGroup::new("g");
        group.calls.push(AsyncCall {
            call_id: vec![1],
            ..AsyncCall::default()
        });
        assert!(group.remove_call(&[1]));
        assert!(!group.remove_call(&[1]));
    }
}
