pub mod address;
pub mod frame;
