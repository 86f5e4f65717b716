#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::similar_names)]

pub mod cli;

mod archive;
mod error;
mod format;
mod freeze;
mod lockfile;
mod locks;
mod logger;
mod manifest;
mod storage;
