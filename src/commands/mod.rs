mod generate;
mod serve;
mod validate;

// Re-export command functions for convenience
pub use generate::generate;
pub use serve::{serve, ServeParams};
pub use validate::validate;
