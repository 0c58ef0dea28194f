pub mod args;
pub mod op;
pub mod ops;

pub use ops::{Domain, Get, Init, Keys, Put, Resolve, Version};
