pub mod classifier;
pub mod session;
