// Host-facing API: flat functions exported across the FFI boundary.

pub mod bridge_api;
pub mod simple;
