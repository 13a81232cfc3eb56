pub mod util;
pub mod verifier;
