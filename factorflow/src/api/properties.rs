use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

pub const NUM_WORKERS: &'static str = "engine.num_workers";
pub const ITERATIONS: &'static str = "engine.iterations";
pub const SEED: &'static str = "engine.seed";
pub const LOG_LEVEL: &'static str = "engine.log_level";

pub trait EngineProperties {
    fn set_num_workers(&mut self, num_workers: usize);
    fn get_num_workers(&self) -> anyhow::Result<usize>;

    fn set_iterations(&mut self, iterations: usize);
    fn get_iterations(&self) -> anyhow::Result<usize>;

    fn set_seed(&mut self, seed: u64);
    fn get_seed(&self) -> anyhow::Result<u64>;

    fn set_log_level(&mut self, level: &str);
    fn get_log_level(&self) -> anyhow::Result<String>;
}

#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Properties {
    properties: HashMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Properties {
            properties: HashMap::new(),
        }
    }

    /// Parse a flat `key: value` YAML mapping. Nested mappings are flattened
    /// into dotted keys, so `engine: { seed: 1 }` becomes `engine.seed`.
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let value: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        let mut properties = Properties::new();
        properties.flatten_yaml("", &value)?;
        Ok(properties)
    }

    pub fn load_yaml<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let mut file = File::open(path)?;
        let mut buffer = String::new();
        file.read_to_string(&mut buffer)?;
        Properties::from_yaml_str(buffer.as_str())
    }

    fn flatten_yaml(&mut self, prefix: &str, value: &serde_yaml::Value) -> anyhow::Result<()> {
        match value {
            serde_yaml::Value::Mapping(mapping) => {
                for (k, v) in mapping {
                    let key = match k {
                        serde_yaml::Value::String(s) => s.clone(),
                        serde_yaml::Value::Number(n) => n.to_string(),
                        serde_yaml::Value::Bool(b) => b.to_string(),
                        _ => return Err(anyhow!("unsupported key type in `{}`", prefix)),
                    };
                    let key = if prefix.is_empty() {
                        key
                    } else {
                        format!("{}.{}", prefix, key)
                    };
                    self.flatten_yaml(key.as_str(), v)?;
                }
                Ok(())
            }
            serde_yaml::Value::String(s) => {
                self.set_str(prefix, s);
                Ok(())
            }
            serde_yaml::Value::Number(n) => {
                self.set_string(prefix.to_string(), n.to_string());
                Ok(())
            }
            serde_yaml::Value::Bool(b) => {
                self.set_bool(prefix, *b);
                Ok(())
            }
            serde_yaml::Value::Null => Ok(()),
            _ => Err(anyhow!("unsupported value for `{}`", prefix)),
        }
    }

    pub fn as_map(&self) -> &HashMap<String, String> {
        &self.properties
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
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

    pub fn set_usize(&mut self, key: &str, value: usize) {
        self.set_string(key.to_string(), value.to_string());
    }

    pub fn get_usize(&self, key: &str) -> anyhow::Result<usize> {
        match self.properties.get(key) {
            Some(v) => usize::from_str(v).map_err(|e| anyhow!("`{}` parse error: {}", key, e)),
            None => Err(anyhow!("`{}` field not found", key)),
        }
    }

    pub fn set_u64(&mut self, key: &str, value: u64) {
        self.set_string(key.to_string(), value.to_string());
    }

    pub fn get_u64(&self, key: &str) -> anyhow::Result<u64> {
        match self.properties.get(key) {
            Some(v) => u64::from_str(v).map_err(|e| anyhow!("`{}` parse error: {}", key, e)),
            None => Err(anyhow!("`{}` field not found", key)),
        }
    }

    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.set_string(key.to_string(), value.to_string());
    }

    pub fn get_bool(&self, key: &str) -> anyhow::Result<bool> {
        match self.properties.get(key) {
            Some(v) => bool::from_str(v).map_err(|e| anyhow!("`{}` parse error: {}", key, e)),
            None => Err(anyhow!("`{}` field not found", key)),
        }
    }
}

impl EngineProperties for Properties {
    fn set_num_workers(&mut self, num_workers: usize) {
        self.set_usize(NUM_WORKERS, num_workers);
    }

    fn get_num_workers(&self) -> anyhow::Result<usize> {
        self.get_usize(NUM_WORKERS)
    }

    fn set_iterations(&mut self, iterations: usize) {
        self.set_usize(ITERATIONS, iterations);
    }

    fn get_iterations(&self) -> anyhow::Result<usize> {
        self.get_usize(ITERATIONS)
    }

    fn set_seed(&mut self, seed: u64) {
        self.set_u64(SEED, seed);
    }

    fn get_seed(&self) -> anyhow::Result<u64> {
        self.get_u64(SEED)
    }

    fn set_log_level(&mut self, level: &str) {
        self.set_str(LOG_LEVEL, level);
    }

    fn get_log_level(&self) -> anyhow::Result<String> {
        self.get_string(LOG_LEVEL)
    }
}

#[cfg(test)]
mod tests {
    use crate::api::properties::{EngineProperties, Properties};

    #[test]
    pub fn row_properties_test() {
        let mut properties = Properties::new();
        assert!(properties.is_empty());
        assert!(properties.get_string("a").is_err());
        assert!(properties.get_usize("u").is_err());

        properties.set_str("u", "x");
        assert!(properties.get_usize("u").is_err());

        properties.set_num_workers(4);
        properties.set_seed(42);
        assert_eq!(properties.get_num_workers().unwrap(), 4);
        assert_eq!(properties.get_seed().unwrap(), 42);
    }

    #[test]
    pub fn yaml_properties_test() {
        let yaml = r#"
verbose: true
engine:
  num_workers: 3
  iterations: 10
  log_level: debug
  seed: 7
"#;
        let properties = Properties::from_yaml_str(yaml).unwrap();
        assert_eq!(properties.get_num_workers().unwrap(), 3);
        assert_eq!(properties.get_iterations().unwrap(), 10);
        assert_eq!(properties.get_seed().unwrap(), 7);
        assert_eq!(properties.get_log_level().unwrap(), "debug");
        assert!(properties.get_bool("verbose").unwrap());
        assert_eq!(properties.as_map().len(), 5);
    }
}
