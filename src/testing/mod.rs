//! Scriptable stand-ins for every capability, plus diagnostic assertions.
//!
//! Each stand-in has one `Option<Behavior<Req, Resp>>` field per capability
//! method. `None` leaves the dispatcher's pre-populated response untouched
//! and adds no diagnostics.
//!
//! # Example
//!
//! ```ignore
//! use hemmer_provider_testkit::testing::{ProviderDouble, ResourceDouble};
//! use hemmer_provider_testkit::{ProviderServer, Registry, Value};
//!
//! let resource = ResourceDouble::with_schema(schema).on_create(|_req, resp| {
//!     resp.new_state.set_attribute("id", Value::string("abc-123")).ok();
//! });
//! let server = ProviderServer::new(
//!     Registry::new(ProviderDouble::default()).with_resource("example_thing", resource),
//! );
//! ```

mod doubles;
mod memory;

use std::fmt;
use std::sync::Arc;

use crate::diagnostic::{Diagnostic, DiagnosticSeverity};

pub use doubles::{
    DataSourceDouble, ListBehavior, ListResourceDouble, ProviderDouble, ResourceDouble,
    StateStoreDouble,
};
pub use memory::InMemoryStateStore;

/// Hook closure type of a [`Behavior`].
pub type HookFn<Req, Resp> = dyn Fn(&Req, &mut Resp) + Send + Sync;

/// How a stand-in answers one capability method.
pub enum Behavior<Req, Resp> {
    /// Replace the response with a clone of this one on every call.
    Respond(Resp),
    /// Run a closure against the request and the pre-populated response.
    Hook(Arc<HookFn<Req, Resp>>),
}

impl<Req, Resp: Clone> Behavior<Req, Resp> {
    /// A canned response.
    pub fn respond(resp: Resp) -> Self {
        Behavior::Respond(resp)
    }

    /// A hook closure.
    pub fn hook(f: impl Fn(&Req, &mut Resp) + Send + Sync + 'static) -> Self {
        Behavior::Hook(Arc::new(f))
    }

    /// Apply this behavior to `resp`.
    pub fn apply(&self, req: &Req, resp: &mut Resp) {
        match self {
            Behavior::Respond(canned) => *resp = canned.clone(),
            Behavior::Hook(f) => f(req, resp),
        }
    }
}

impl<Req, Resp: Clone> Clone for Behavior<Req, Resp> {
    fn clone(&self) -> Self {
        match self {
            Behavior::Respond(resp) => Behavior::Respond(resp.clone()),
            Behavior::Hook(f) => Behavior::Hook(Arc::clone(f)),
        }
    }
}

impl<Req, Resp: fmt::Debug> fmt::Debug for Behavior<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Behavior::Respond(resp) => f.debug_tuple("Respond").field(resp).finish(),
            Behavior::Hook(_) => f.write_str("Hook(..)"),
        }
    }
}

pub(crate) fn run<Req, Resp: Clone>(
    behavior: &Option<Behavior<Req, Resp>>,
    req: &Req,
    resp: &mut Resp,
) {
    if let Some(behavior) = behavior {
        behavior.apply(req, resp);
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
        .collect();

    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| d.to_string()).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain at least one error.
///
/// # Panics
///
/// Panics if there are no error diagnostics.
pub fn assert_has_errors(diagnostics: &[Diagnostic]) {
    let has_errors = diagnostics
        .iter()
        .any(|d| matches!(d.severity, DiagnosticSeverity::Error));

    assert!(has_errors, "Expected at least one error, but got none");
}

/// Assert that diagnostics contain an error whose summary or detail contains
/// `substring`.
///
/// # Panics
///
/// Panics if no error diagnostic matches.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let has_matching_error = diagnostics.iter().any(|d| {
        matches!(d.severity, DiagnosticSeverity::Error)
            && (d.summary.contains(substring)
                || d.detail.as_deref().is_some_and(|detail| detail.contains(substring)))
    });

    assert!(
        has_matching_error,
        "Expected an error containing '{}', but no matching error found. Errors: {:?}",
        substring,
        diagnostics
            .iter()
            .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
    );
}
