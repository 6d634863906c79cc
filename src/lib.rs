pub mod model;
pub mod protocols;
pub mod runtime;
