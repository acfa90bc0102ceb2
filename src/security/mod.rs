pub mod cors;
pub mod headers;
pub mod webhook;
