#![warn(missing_docs)]

//! STEP backend for the stepglb kernel traits.
//!
//! Parses ISO 10303-21 files with `ruststep`, rebuilds B-rep shells with
//! `truck-stepio` and triangulates them with `truck-meshalgo`. The assembly
//! structure (products, representation relationships, item-defined
//! transformations) is recovered from the same parsed data section and
//! exposed as a label tree.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use stepglb_kernel::{CadDocument, CadKernel};
//! use stepglb_kernel_step::StepKernel;
//!
//! let doc = StepKernel::new().read_step(Path::new("model.step")).unwrap();
//! for label in doc.free_labels() {
//!     println!("{} {:?}", label.entry(), doc.name(&label));
//! }
//! ```

mod assembly;
mod entities;
mod reader;

pub use reader::{StepDocument, StepKernel};
