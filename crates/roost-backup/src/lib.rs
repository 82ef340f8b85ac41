//! Backup/restore primitive for Roost instances
//!
//! A reusable, idempotent, non-blocking protocol over external data-mover
//! batch Jobs. Used for pre-update backups, delete-time backups, rollback
//! restores, create-time restores, and periodic backups. Callers never
//! block: every invocation either creates the Job or inspects its terminal
//! condition, and reports one of succeeded / failed / in-progress.

pub mod job;
pub mod paths;
pub mod protocol;

pub use job::{TransferDirection, TransferPurpose, TransferSpec};
pub use protocol::{ensure_transfer, remove_transfer, JobOutcome};
