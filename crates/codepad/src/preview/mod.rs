//! Preview document assembly
//!
//! Turns the files produced by the compile service into one HTML document
//! with no external references, ready to be hosted in the sandbox.

pub use crate::preview::assembler::{assemble, ordered_scripts, rewrite_script};
pub use crate::preview::markup::strip_external_references;

mod assembler;
mod markup;
