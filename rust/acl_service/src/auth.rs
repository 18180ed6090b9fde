//! Thread-local run-as authentication.
//!
//! Every check is made on behalf of the current run-as authentication. It is
//! scoped: [`run_as`] installs one for the duration of a closure and restores
//! the previous one afterwards, also on unwind.

use std::cell::RefCell;

/// An authenticated principal plus the authorities granted at login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authentication {
    pub username: String,
    pub granted_authorities: Vec<String>,
}

impl Authentication {
    pub fn user(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            granted_authorities: Vec::new(),
        }
    }

    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.granted_authorities.push(authority.into());
        self
    }
}

thread_local! {
    static RUN_AS: RefCell<Option<Authentication>> = const { RefCell::new(None) };
}

/// Restores the previous authentication on drop.
struct Restore(Option<Authentication>);

impl Drop for Restore {
    fn drop(&mut self) {
        let previous = self.0.take();
        RUN_AS.with(|cell| *cell.borrow_mut() = previous);
    }
}

/// Run `work` as `authentication`.
pub fn run_as<T>(authentication: Authentication, work: impl FnOnce() -> T) -> T {
    let previous = RUN_AS.with(|cell| cell.borrow_mut().replace(authentication));
    let _restore = Restore(previous);
    work()
}

/// Run `work` as `username` with no extra granted authorities.
pub fn run_as_user<T>(username: &str, work: impl FnOnce() -> T) -> T {
    run_as(Authentication::user(username), work)
}

/// The current run-as authentication.
pub fn current() -> Option<Authentication> {
    RUN_AS.with(|cell| cell.borrow().clone())
}

/// The current run-as user name.
pub fn current_user() -> Option<String> {
    RUN_AS.with(|cell| cell.borrow().as_ref().map(|a| a.username.clone()))
}

/// Replace the current authentication outside of a scope, returning the old one.
pub fn set_current(authentication: Option<Authentication>) -> Option<Authentication> {
    RUN_AS.with(|cell| std::mem::replace(&mut *cell.borrow_mut(), authentication))
}
