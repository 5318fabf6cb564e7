#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod http;
pub mod moisture;
pub mod payload;
pub mod reading;
