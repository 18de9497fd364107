//! Dossier Auth crate - API key derivation and role-gated access control.

pub mod apikey;
pub mod gate;

pub use apikey::{derive_key, generate_key, ContentToHash};
pub use gate::AccessGate;
