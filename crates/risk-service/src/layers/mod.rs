pub(crate) mod inference;
pub(crate) mod policy;
pub(crate) mod service;
