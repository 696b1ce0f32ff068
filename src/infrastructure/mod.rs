//! Infrastructure shared by the kernel core components

pub mod lwlock;
