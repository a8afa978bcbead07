pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::{FailingBackend, StubBackend};

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;
