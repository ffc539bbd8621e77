//! Tool descriptors, ownership catalog and execution outcomes

pub mod catalog;
pub mod descriptor;
pub mod value_objects;
