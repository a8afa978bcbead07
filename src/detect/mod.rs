//! Detection core: backend contract, decoding, suppression, sessions.

pub mod backend;
pub mod backends;
mod decoder;
mod result;
mod session;
mod suppress;

pub use backend::{BackendKind, InferenceBackend, IoSpec, RawOutput};
pub use decoder::{decode, label_for, PERSON_CLASS};
pub use result::{Detection, DetectionResult, DensityLevel};
pub use session::{
    attempt_variants, BackendStrategy, LoadError, LoadStrategy, ModelSession, ModelSessionManager,
    SessionState,
};
pub use suppress::suppress;

#[cfg(feature = "backend-tract")]
pub use session::TractStrategy;
