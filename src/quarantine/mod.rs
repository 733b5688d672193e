//! Unwanted-file policy.
//!
//! A created file whose extension is on the denylist is either deleted in
//! place or moved into a quarantine directory. Both actions are
//! best-effort: failures are reported to the caller, which logs them and
//! keeps watching.

mod extension;
mod policy;

pub use extension::{UnwantedExtensions, extension_of};
pub use policy::{QuarantineError, QuarantineOutcome, QuarantinePolicy};
