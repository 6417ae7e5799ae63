pub mod eviction;
pub mod pods;
pub mod selector;
pub mod target;

#[cfg(test)]
pub(crate) mod mock;
