pub mod frame;
pub mod identity;
