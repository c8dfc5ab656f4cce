pub(crate) mod fakes;
pub(crate) mod fixtures;

mod config_test;
