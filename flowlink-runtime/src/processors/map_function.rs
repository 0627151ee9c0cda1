use std::sync::Arc;

use flowlink_core::function::MapFunction;
use flowlink_core::item::Item;

type MapFn = dyn Fn(Item) -> anyhow::Result<Item> + Send + Sync;

#[derive(Function)]
#[function_name = "FnMap"]
pub struct FnMapFunction {
    f: Arc<MapFn>,
}

impl FnMapFunction {
    pub fn new(f: Arc<MapFn>) -> Self {
        FnMapFunction { f }
    }
}

#[async_trait]
impl MapFunction for FnMapFunction {
    async fn map(&mut self, item: Item) -> anyhow::Result<Item> {
        (self.f)(item)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use flowlink_core::function::{Function, MapFunction};
    use flowlink_core::item::Item;

    use crate::processors::map_function::FnMapFunction;

    #[tokio::test]
    pub async fn fn_map_test() {
        let f: Arc<dyn Fn(Item) -> anyhow::Result<Item> + Send + Sync> =
            Arc::new(|item: Item| Ok(Item::from(item.to_string())));
        let mut f = FnMapFunction::new(f);
        assert_eq!(f.name(), "FnMap");
        assert_eq!(f.map(Item::from(3)).await.unwrap(), Item::from("3"));
    }
}
