//! Support library for the glosa command-line tools.

pub mod source;
