//! Signature cipher resolution
//!
//! Cuts the dispatcher function and its helpers out of a fetched player
//! script, caches the assembled program and evaluates it over batches of
//! obfuscated signatures.

pub mod assemble;
pub mod cache;
pub mod evaluator;
pub mod extract;
pub mod locator;
pub mod resolver;
pub mod task;

pub use assemble::*;
pub use cache::*;
pub use evaluator::*;
pub use extract::*;
pub use locator::*;
pub use resolver::*;
pub use task::*;
