//! Admission control: fixed-window quotas per client and overall, and the
//! deadline each admitted request runs under

#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

mod error;
mod gate;
pub mod storage;

pub use error::RateLimitError;
pub use gate::{Admission, AdmissionGate, RequestDeadline};
