//! Client side of the measurement-worker control protocol.
//!
//! A worker is a long-lived process that replays recorded invocations of
//! one extracted loop. The client asks it to load a candidate shared
//! library and report the measured time, or to terminate. One connection
//! carries exactly one request; concurrency comes from issuing requests
//! from multiple threads, never from pipelining.

pub mod measure;
pub mod protocol;
pub mod registry;

pub use measure::WorkerMeasure;
pub use protocol::{kill_worker, run_candidate, ProtocolError};
pub use registry::{RegistryError, WorkerRegistry};
