pub mod envelope;
pub mod error;
pub mod guard;
pub mod mutate;
pub mod patch;
pub mod policy;
pub mod response;
pub mod validate;
