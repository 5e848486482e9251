//! Core data types for Rentbill

pub mod invoice;
pub mod order;
pub mod wallet;
