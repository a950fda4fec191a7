//! Command line interface for ranking posting-list fixtures.

pub mod args;
pub mod commands;
pub mod fixture;
pub mod output;

// Re-export commonly used types
pub use args::*;
pub use commands::*;
pub use fixture::{Fixture, FixtureLookups, GenerateParams, random_fixture};
pub use output::*;
