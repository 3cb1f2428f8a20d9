pub mod instruction;
pub mod transport;
