//! Build-scoped cooperative cancellation.

mod token;

pub use token::CancellationToken;
