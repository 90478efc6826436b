pub mod tags;
pub mod tasks;
pub mod transfer;
