pub(crate) mod config;
pub(crate) mod domain_list;
pub(crate) mod lexicon;
