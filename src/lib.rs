#![cfg_attr(doc, warn(missing_docs))]
#![doc = include_str!("../README.md")]

pub mod input;
pub mod render;
pub mod repl;
pub mod session;
pub mod vm;
