pub mod routing;
pub mod topology;

#[cfg(test)]
pub(crate) mod fixtures;
