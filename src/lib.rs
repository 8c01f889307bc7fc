pub mod bins;
pub mod cancel;
pub mod config;
pub mod decisions;
pub mod density;
pub mod error;
pub mod ncc;
pub mod ncc_structs;
pub mod network;
pub mod pipeline;
pub mod resolve;
pub mod rewrite;
pub mod sorts;

#[cfg(feature = "python")]
pub mod python_bindings;

pub use bins::{load_contact_index, ContactIndex};
pub use cancel::CancelToken;
pub use config::{CleanParams, IndexParams, PipelineConfig, ResolveParams};
pub use decisions::Decisions;
pub use density::remove_isolated_unambig;
pub use error::{NccError, Result};
pub use network::NetworkScorer;
pub use pipeline::run_pipeline;
pub use resolve::resolve_contacts;
pub use rewrite::PassReport;

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// The Python module definition
#[cfg(feature = "python")]
#[pymodule]
fn ncc_resolve(m: &Bound<'_, PyModule>) -> PyResult<()> {
    python_bindings::register(m)
}
