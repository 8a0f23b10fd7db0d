//! Fetch engine: walks a canon against the content service, extracts verse
//! fragments, and persists raw and cleaned chapters.

pub mod build_id;
pub mod cancel;
pub mod client;
pub mod engine;
pub mod extract;
pub mod limiter;
pub mod output;
pub mod policy;
pub mod reclean;
pub mod transport;

pub use build_id::{build_id_from_page, discover_build_id, BuildIdError};
pub use cancel::CancelSignal;
pub use client::{ContentClient, FetchError};
pub use engine::{run_fetch, RunContext, RunOptions};
pub use extract::{ExtractError, Extractor};
pub use limiter::RateLimiter;
pub use output::{RawWriter, RunManifest};
pub use policy::FetchPolicy;
pub use reclean::{clean_tree, CleanSummary};
pub use transport::{HttpTransport, Transport, TransportError, TransportResponse};

#[cfg(test)]
mod testing;
