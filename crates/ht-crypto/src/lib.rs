#![forbid(unsafe_code)]

pub mod hash;
pub mod keys;
pub mod utils;

pub mod envelope;

#[cfg(test)]
mod proptests;
