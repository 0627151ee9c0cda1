//! Built-in vertex processors over the shared lists

pub mod list_input_format;
pub mod list_output_format;
pub mod map_function;

use std::sync::Arc;

use flowlink_core::cluster::ClientConfig;
use flowlink_core::function::Processor;
use flowlink_core::item::Item;

use crate::processors::list_input_format::ListInputFormat;
use crate::processors::list_output_format::ListOutputFormat;
use crate::processors::map_function::FnMapFunction;
use crate::storage::list::ListStore;

/// Source over a snapshot of the list `name`, items split across instances by index
pub fn read_list(store: ListStore, name: &str) -> Processor {
    let name = name.to_string();
    Processor::source(move || ListInputFormat::new(store.clone(), name.as_str()))
}

pub fn read_remote_list(client_config: ClientConfig, name: &str) -> Processor {
    read_list(ListStore::remote(client_config), name)
}

/// Sink appending every item to the list `name`
pub fn write_list(store: ListStore, name: &str) -> Processor {
    let name = name.to_string();
    Processor::sink(move || ListOutputFormat::new(store.clone(), name.as_str()))
}

pub fn write_remote_list(client_config: ClientConfig, name: &str) -> Processor {
    write_list(ListStore::remote(client_config), name)
}

pub fn map<F>(f: F) -> Processor
where
    F: Fn(Item) -> anyhow::Result<Item> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    Processor::map(move || FnMapFunction::new(f.clone()))
}
