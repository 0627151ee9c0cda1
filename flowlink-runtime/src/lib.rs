#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate log;
#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate async_trait;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate flowlink_derive;

pub mod dag;
pub mod logger;
pub mod member;
pub mod net;
pub mod processors;
pub mod runtime;
pub mod storage;
pub mod utils;

pub use flowlink_core as core;
