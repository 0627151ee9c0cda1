use std::collections::HashMap;
use std::fmt::Display;
use std::ops::Index;
use std::str::FromStr;
use std::time::Duration;

use crate::channel::DEFAULT_CHANNEL_CAPACITY;
use crate::cluster::WorkerConfig;

pub const DEFAULT_READ_PAGE_SIZE: usize = 256;

/// Typed accessors for the settings the engine reads from job `Properties`
pub trait SystemProperties {
    fn set_job_name(&mut self, job_name: &str);
    fn get_job_name(&self) -> anyhow::Result<String>;

    fn set_channel_capacity(&mut self, capacity: usize);
    /// capacity of every edge channel, `DEFAULT_CHANNEL_CAPACITY` when absent
    fn get_channel_capacity(&self) -> usize;

    fn set_num_workers(&mut self, num_workers: usize);
    fn get_num_workers(&self) -> Option<usize>;

    fn set_read_page_size(&mut self, page_size: usize);
    /// number of items fetched per store read by list sources
    fn get_read_page_size(&self) -> usize;
}

#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Properties {
    name: String,
    properties: HashMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Properties {
            name: "".to_string(),
            properties: HashMap::new(),
        }
    }

    pub fn from_worker_config(worker_config: &WorkerConfig) -> Self {
        let mut properties = Properties::new();
        properties.set_num_workers(worker_config.num_workers);
        properties.set_channel_capacity(worker_config.channel_capacity);
        properties
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn as_map(&self) -> &HashMap<String, String> {
        &self.properties
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn set_str(&mut self, key: &str, value: &str) {
        self.properties.insert(key.to_string(), value.to_string());
    }

    pub fn set_string(&mut self, key: String, value: String) {
        self.properties.insert(key, value);
    }

    pub fn get_string(&self, key: &str) -> anyhow::Result<String> {
        match self.properties.get(key) {
            Some(v) => Ok(v.clone()),
            None => Err(anyhow!("`{}` field not found", key)),
        }
    }

    fn set_value<V: Display>(&mut self, key: &str, value: V) {
        self.set_string(key.to_string(), value.to_string());
    }

    fn get_value<V>(&self, key: &str) -> anyhow::Result<V>
    where
        V: FromStr,
        V::Err: Display,
    {
        match self.properties.get(key) {
            Some(v) => V::from_str(v).map_err(|e| anyhow!("`{}` field parse error. {}", key, e)),
            None => Err(anyhow!("`{}` field not found", key)),
        }
    }

    pub fn set_u32(&mut self, key: &str, value: u32) {
        self.set_value(key, value)
    }

    pub fn get_u32(&self, key: &str) -> anyhow::Result<u32> {
        self.get_value(key)
    }

    pub fn set_usize(&mut self, key: &str, value: usize) {
        self.set_value(key, value)
    }

    pub fn get_usize(&self, key: &str) -> anyhow::Result<usize> {
        self.get_value(key)
    }

    pub fn set_u64(&mut self, key: &str, value: u64) {
        self.set_value(key, value)
    }

    pub fn get_u64(&self, key: &str) -> anyhow::Result<u64> {
        self.get_value(key)
    }

    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.set_value(key, value)
    }

    pub fn get_bool(&self, key: &str) -> anyhow::Result<bool> {
        self.get_value(key)
    }

    pub fn set_duration(&mut self, key: &str, interval: Duration) {
        self.set_u64(key, interval.as_millis() as u64);
    }

    pub fn get_duration(&self, key: &str) -> anyhow::Result<Duration> {
        let value = self.get_u64(key)?;
        Ok(Duration::from_millis(value))
    }

    pub fn to_sub_properties(&self, prefix_key: &str) -> Properties {
        let mut properties = Properties::new();
        properties.name = prefix_key.to_string();

        let pre_key = format!("{}.", prefix_key);
        for (key, value) in self.as_map() {
            if key.starts_with(pre_key.as_str()) {
                let key = key.index(pre_key.len()..);
                properties.set_string(key.to_owned(), value.to_owned());
            }
        }

        properties
    }

    pub fn to_lines_string(&self) -> String {
        let mut lines: Vec<String> = self
            .properties
            .iter()
            .map(|(k, v)| format!("{}:{}", k, v))
            .collect();
        lines.sort();
        lines.join("\n")
    }
}

const SYSTEM_JOB_NAME: &str = "SYSTEM_JOB_NAME";
const SYSTEM_CHANNEL_CAPACITY: &str = "SYSTEM_CHANNEL_CAPACITY";
const SYSTEM_NUM_WORKERS: &str = "SYSTEM_NUM_WORKERS";
const SYSTEM_READ_PAGE_SIZE: &str = "SYSTEM_READ_PAGE_SIZE";

impl SystemProperties for Properties {
    fn set_job_name(&mut self, job_name: &str) {
        self.set_str(SYSTEM_JOB_NAME, job_name);
    }

    fn get_job_name(&self) -> anyhow::Result<String> {
        self.get_string(SYSTEM_JOB_NAME)
    }

    fn set_channel_capacity(&mut self, capacity: usize) {
        self.set_usize(SYSTEM_CHANNEL_CAPACITY, capacity);
    }

    fn get_channel_capacity(&self) -> usize {
        self.get_usize(SYSTEM_CHANNEL_CAPACITY)
            .unwrap_or(DEFAULT_CHANNEL_CAPACITY)
    }

    fn set_num_workers(&mut self, num_workers: usize) {
        self.set_usize(SYSTEM_NUM_WORKERS, num_workers);
    }

    fn get_num_workers(&self) -> Option<usize> {
        self.get_usize(SYSTEM_NUM_WORKERS).ok()
    }

    fn set_read_page_size(&mut self, page_size: usize) {
        self.set_usize(SYSTEM_READ_PAGE_SIZE, page_size);
    }

    fn get_read_page_size(&self) -> usize {
        self.get_usize(SYSTEM_READ_PAGE_SIZE)
            .unwrap_or(DEFAULT_READ_PAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::properties::{Properties, SystemProperties};

    #[test]
    pub fn typed_properties_test() {
        let mut properties = Properties::new();
        assert!(properties.get_string("a").is_err());

        properties.set_u32("u32", 32);
        properties.set_bool("flag", true);
        properties.set_duration("timeout", Duration::from_secs(2));
        properties.set_str("bad", "x");

        assert_eq!(properties.get_u32("u32").unwrap(), 32);
        assert!(properties.get_bool("flag").unwrap());
        assert_eq!(
            properties.get_duration("timeout").unwrap(),
            Duration::from_secs(2)
        );
        assert!(properties.get_u64("bad").is_err());
    }

    #[test]
    pub fn sub_properties_test() {
        let mut properties = Properties::new();
        properties.set_str("a.b", "v0");
        properties.set_str("a.b.c", "v1");
        properties.set_str("a.b.c.d", "v2");

        let sub_properties = properties.to_sub_properties("a.b");
        assert_eq!(sub_properties.name(), "a.b");
        assert_eq!(sub_properties.get_string("c").unwrap(), "v1");
        assert_eq!(sub_properties.get_string("c.d").unwrap(), "v2");
        assert!(!sub_properties.contains_key("b"));
    }

    #[test]
    pub fn system_properties_test() {
        let mut properties = Properties::new();
        assert_eq!(properties.get_channel_capacity(), 1024);
        assert_eq!(properties.get_num_workers(), None);

        properties.set_job_name("remote-list");
        properties.set_channel_capacity(8);
        properties.set_num_workers(3);
        assert_eq!(properties.get_job_name().unwrap(), "remote-list");
        assert_eq!(properties.get_channel_capacity(), 8);
        assert_eq!(properties.get_num_workers(), Some(3));
    }
}
