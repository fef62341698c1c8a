//! The job ledger: typed job records, their status machine and the store
//! that persists them.

pub mod error;
pub mod record;
pub mod store;

pub use error::LedgerError;
pub use record::{derive_job_id, resolve_url, JobRecord, JobStatus, RawJob};
pub use store::{JobStore, StatusFilter};
