use metrics::{Counter, Gauge, Key, KeyName, Label};

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Tag(pub(crate) String, pub(crate) String);

impl Tag {
    pub fn new<F, C>(field: F, context: C) -> Self
    where
        F: ToString,
        C: ToString,
    {
        Tag(field.to_string(), context.to_string())
    }

    pub fn field(&self) -> &str {
        self.0.as_str()
    }

    pub fn context(&self) -> &str {
        self.1.as_str()
    }
}

impl<F, C> From<(F, C)> for Tag
where
    F: ToString,
    C: ToString,
{
    fn from((field, context): (F, C)) -> Self {
        Tag::new(field, context)
    }
}

fn to_key<K: ToString>(name: K, tags: Vec<Tag>) -> Key {
    let labels: Vec<Label> = tags.into_iter().map(|t| Label::new(t.0, t.1)).collect();
    Key::from_parts(KeyName::from(name.to_string()), labels)
}

/// register a counter on the installed recorder, or a noop counter when none is installed
pub fn register_counter<K>(name: K, tags: Vec<Tag>) -> Counter
where
    K: ToString,
{
    let key = to_key(name, tags);
    match metrics::try_recorder() {
        Some(recorder) => recorder.register_counter(&key),
        None => Counter::noop(),
    }
}

pub fn register_gauge<K>(name: K, tags: Vec<Tag>) -> Gauge
where
    K: ToString,
{
    let key = to_key(name, tags);
    match metrics::try_recorder() {
        Some(recorder) => recorder.register_gauge(&key),
        None => Gauge::noop(),
    }
}

#[cfg(test)]
mod tests {
    use crate::metrics::{register_counter, register_gauge, Tag};

    #[test]
    pub fn noop_without_recorder_test() {
        let counter = register_counter("test.counter", vec![Tag::from(("vertex", "map"))]);
        counter.increment(1);

        let gauge = register_gauge("test.gauge", vec![]);
        gauge.increment(1.0);
        gauge.decrement(1.0);
    }
}
