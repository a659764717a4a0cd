extern crate url;

pub mod wire;
