pub mod version;
pub mod canon;
pub mod verse;
pub mod report;

pub use version::*;
pub use canon::*;
pub use verse::*;
pub use report::*;
