use crate::item::Item;
use crate::TaskId;

/// Unit carried by an edge channel
#[derive(Clone, Debug, PartialEq)]
pub enum Element {
    Record(Item),
    /// the producer has no more records. exactly one per channel
    EndOfStream(TaskId),
}

impl Element {
    pub fn is_record(&self) -> bool {
        match self {
            Element::Record(_) => true,
            _ => false,
        }
    }

    pub fn is_end_of_stream(&self) -> bool {
        match self {
            Element::EndOfStream(_) => true,
            _ => false,
        }
    }
}

impl From<Item> for Element {
    fn from(item: Item) -> Self {
        Element::Record(item)
    }
}
