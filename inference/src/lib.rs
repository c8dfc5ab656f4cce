pub mod cli;
pub mod engine;
pub mod error;
#[cfg(test)]
mod tests;

pub const SERVICE_NAME: &str = "cropscan";
