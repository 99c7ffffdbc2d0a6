pub mod checksum;
pub mod config;
pub mod engine;
pub mod path;
pub mod remote;
pub mod resolver;
pub mod retry;
pub mod session;

#[cfg(test)]
mod test_support;
