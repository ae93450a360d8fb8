// SPDX-License-Identifier: Apache-2.0

//! Field extraction from log lines.
//!
//! - [`Extractor`] applies a source's pattern and casts to a line
//! - [`Cast`] converts captured text into typed values

mod cast;
mod extractor;

pub use cast::Cast;
pub use extractor::Extractor;
