// vim: tw=80

// I don't find this lint very helpful
#![allow(clippy::type_complexity)]

// Block drivers conventionally use acronyms like RAID in upper case.
#![allow(clippy::upper_case_acronyms)]

// A DiskSet is never empty
#![allow(clippy::len_without_is_empty)]

pub mod bio;
pub mod cluster;
pub mod config;
pub mod device;
pub mod disk;
pub mod dispatch;
pub mod file_disk;
pub mod mem_disk;
pub mod raid0;
pub mod split;
pub mod stripe;
pub mod types;

pub use crate::types::*;
