//! Change tracking for update validation.
//!
//! On update, a leaf value that is deep-equal to its previous version is not
//! re-validated. [`RatchetState`] keeps one "changed" flag per traversal
//! scope; a changed descendant marks every enclosing scope as changed when
//! its scope exits.
//!
//! Scopes are entered through [`RatchetState::enter_scope`], whose guard
//! exits the scope on drop, so an early return or a panic still leaves the
//! stack balanced.

use std::ops::{Deref, DerefMut};

/// The kind of request being validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
}

/// Stack of per-scope change flags for one traversal.
///
/// Not shareable between traversals: every method takes `&mut self`.
#[derive(Debug, Clone)]
pub struct RatchetState {
    frames: Vec<bool>,
}

impl Default for RatchetState {
    fn default() -> Self {
        Self::new()
    }
}

impl RatchetState {
    /// A single unchanged root frame.
    pub fn new() -> Self {
        Self {
            frames: vec![false],
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Whether the current scope saw a change. `false` once the stack is empty.
    pub fn has_changed(&self) -> bool {
        self.frames.last().copied().unwrap_or(false)
    }

    /// Pushes an unchanged frame; the guard pops it on drop.
    pub fn enter_scope(&mut self) -> ScopeGuard<'_> {
        self.frames.push(false);
        ScopeGuard { state: self }
    }

    /// Pops the top frame, propagating a change to its parent.
    ///
    /// # Panics
    ///
    /// Panics if the stack is empty; scopes must be balanced.
    pub fn exit_scope(&mut self) -> bool {
        let Some(changed) = self.frames.pop() else {
            panic!("ratchet scope stack underflow");
        };
        if changed {
            if let Some(parent) = self.frames.last_mut() {
                *parent = true;
            }
        }
        changed
    }

    fn mark_changed(&mut self) {
        if let Some(top) = self.frames.last_mut() {
            *top = true;
        }
    }

    /// Runs `check` on a leaf unless it is an unchanged update.
    ///
    /// An update without an old value counts as a change.
    pub fn leaf<T, R, F>(&mut self, operation: Operation, new: &T, old: Option<&T>, check: F) -> R
    where
        T: PartialEq + ?Sized,
        R: Default,
        F: FnOnce(&T) -> R,
    {
        match operation {
            Operation::Create => check(new),
            Operation::Update => {
                if old.is_some_and(|old| old == new) {
                    return R::default();
                }
                self.mark_changed();
                check(new)
            }
        }
    }

    /// Recurses into a composite value inside its own scope.
    ///
    /// Composite values are never compared here: a descendant may have
    /// changed even when this level looks equal.
    pub fn branch<R, F>(&mut self, recurse: F) -> R
    where
        F: FnOnce(&mut RatchetState) -> R,
    {
        let mut scope = self.enter_scope();
        recurse(&mut scope)
    }
}

/// Exits its scope when dropped.
pub struct ScopeGuard<'a> {
    state: &'a mut RatchetState,
}

impl Deref for ScopeGuard<'_> {
    type Target = RatchetState;

    fn deref(&self) -> &RatchetState {
        self.state
    }
}

impl DerefMut for ScopeGuard<'_> {
    fn deref_mut(&mut self) -> &mut RatchetState {
        self.state
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.state.exit_scope();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counting_check(calls: &Cell<u32>) -> impl FnOnce(&i64) -> Vec<String> + '_ {
        move |v| {
            calls.set(calls.get() + 1);
            vec![format!("checked {}", v)]
        }
    }

    #[test]
    fn test_unchanged_update_skips_check() {
        let calls = Cell::new(0);
        let mut state = RatchetState::new();
        let errors = state.leaf(Operation::Update, &5, Some(&5), counting_check(&calls));
        assert!(errors.is_empty());
        assert_eq!(calls.get(), 0);
        assert!(!state.has_changed());
    }

    #[test]
    fn test_changed_update_propagates() {
        let calls = Cell::new(0);
        let mut state = RatchetState::new();
        {
            let mut scope = state.enter_scope();
            let errors = scope.leaf(Operation::Update, &6, Some(&5), counting_check(&calls));
            assert_eq!(errors, vec!["checked 6".to_string()]);
            assert!(scope.has_changed());
        }
        assert_eq!(calls.get(), 1);
        assert!(state.has_changed());
    }

    #[test]
    fn test_create_always_checks() {
        let calls = Cell::new(0);
        let mut state = RatchetState::new();
        state.leaf(Operation::Create, &5, Some(&5), counting_check(&calls));
        assert_eq!(calls.get(), 1);
        assert!(!state.has_changed());
    }

    #[test]
    fn test_update_without_old_value_is_a_change() {
        let calls = Cell::new(0);
        let mut state = RatchetState::new();
        state.leaf(Operation::Update, &5, None, counting_check(&calls));
        assert_eq!(calls.get(), 1);
        assert!(state.has_changed());
    }

    #[test]
    fn test_branch_balances_stack() {
        let mut state = RatchetState::new();
        let changed = state.branch(|inner| {
            assert_eq!(inner.depth(), 2);
            inner.branch(|leaf_scope| {
                leaf_scope.leaf(Operation::Update, "b", Some("a"), |_| ());
            });
            inner.has_changed()
        });
        assert!(changed);
        assert_eq!(state.depth(), 1);
        assert!(state.has_changed());
    }

    #[test]
    fn test_outermost_exit_empties_stack() {
        let mut state = RatchetState::new();
        assert!(!state.exit_scope());
        assert_eq!(state.depth(), 0);
        assert!(!state.has_changed());
    }

    #[test]
    #[should_panic(expected = "underflow")]
    fn test_exit_on_empty_stack_panics() {
        let mut state = RatchetState::new();
        state.exit_scope();
        state.exit_scope();
    }

    #[test]
    fn test_guard_pops_on_panic() {
        let mut state = RatchetState::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _scope = state.enter_scope();
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(state.depth(), 1);
    }
}
