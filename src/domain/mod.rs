pub mod email;
pub mod filter;
