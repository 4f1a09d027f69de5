//! Entry-point support for the `alertrelay` binary: configuration loading
//! and the read-decode-dispatch sequence for one payload.

pub mod config;
pub mod run;
