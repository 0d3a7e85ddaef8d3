//! Instruction implementations

pub mod alu;
pub mod control;
pub mod memory;
pub mod texture;
