use std::fmt::{Display, Formatter};
use std::io::Cursor;

/// A value flowing through a pipeline and stored in named lists.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Item {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

impl Item {
    pub fn is_null(&self) -> bool {
        match self {
            Item::Null => true,
            _ => false,
        }
    }

    pub fn as_int(&self) -> anyhow::Result<i64> {
        match self {
            Item::Int(v) => Ok(*v),
            _ => Err(anyhow!("item {:?} is not an integer", self)),
        }
    }

    pub fn as_str(&self) -> anyhow::Result<&str> {
        match self {
            Item::Str(v) => Ok(v.as_str()),
            _ => Err(anyhow!("item {:?} is not a string", self)),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Item::Null => "null",
            Item::Bool(_) => "bool",
            Item::Int(_) => "int",
            Item::Float(_) => "float",
            Item::Str(_) => "str",
            Item::Bytes(_) => "bytes",
        }
    }

    /// murmur3 hash of the serialized value, stable across processes
    pub fn hash_code(&self) -> anyhow::Result<u32> {
        let bytes = serde_json::to_vec(self)?;
        let hash = murmur3::murmur3_32(&mut Cursor::new(bytes), 0)?;
        Ok(hash)
    }
}

impl Display for Item {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Item::Null => write!(f, "null"),
            Item::Bool(v) => write!(f, "{}", v),
            Item::Int(v) => write!(f, "{}", v),
            Item::Float(v) => write!(f, "{}", v),
            Item::Str(v) => write!(f, "{}", v),
            Item::Bytes(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<i64> for Item {
    fn from(v: i64) -> Self {
        Item::Int(v)
    }
}

impl From<i32> for Item {
    fn from(v: i32) -> Self {
        Item::Int(v as i64)
    }
}

impl From<usize> for Item {
    fn from(v: usize) -> Self {
        Item::Int(v as i64)
    }
}

impl From<bool> for Item {
    fn from(v: bool) -> Self {
        Item::Bool(v)
    }
}

impl From<f64> for Item {
    fn from(v: f64) -> Self {
        Item::Float(v)
    }
}

impl From<String> for Item {
    fn from(v: String) -> Self {
        Item::Str(v)
    }
}

impl<'a> From<&'a str> for Item {
    fn from(v: &'a str) -> Self {
        Item::Str(v.to_string())
    }
}

impl From<Vec<u8>> for Item {
    fn from(v: Vec<u8>) -> Self {
        Item::Bytes(v)
    }
}

#[cfg(test)]
mod tests {
    use crate::item::Item;

    #[test]
    pub fn display_test() {
        assert_eq!(Item::from(7).to_string(), "7");
        assert_eq!(Item::from("seven").to_string(), "seven");
        assert_eq!(Item::Null.to_string(), "null");
    }

    #[test]
    pub fn hash_code_stable_test() {
        let a = Item::from("key").hash_code().unwrap();
        let b = Item::from("key").hash_code().unwrap();
        assert_eq!(a, b);
        assert_ne!(a, Item::from("other").hash_code().unwrap());
    }

    #[test]
    pub fn accessor_test() {
        assert_eq!(Item::from(3).as_int().unwrap(), 3);
        assert!(Item::from("3").as_int().is_err());
        assert_eq!(Item::from("3").as_str().unwrap(), "3");
    }
}
