//! Construcción de sobres y despacho de jobs.

mod dispatcher;
mod envelope;

pub use dispatcher::{DispatchError, DispatchHandle, JobDispatcher, NullDispatcher};
pub use envelope::{storage_input_ref, storage_output_ref, EnvelopeFinding, InputEnvelope, JobStatus, OutputEnvelope};
