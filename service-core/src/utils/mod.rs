pub mod signature;

pub use signature::{constant_time_eq, sign_hex, verify_hex};
