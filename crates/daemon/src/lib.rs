#![forbid(unsafe_code)]

//! HTTP front end for the OBPO task pipeline.

pub mod cli;
pub mod http;
