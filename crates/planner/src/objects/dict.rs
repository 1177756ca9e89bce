use crate::objects::{ObjectBehavior, ObjectType, QlObject};

/// Script dictionary literal. Keys and values are kept as parallel lists.
#[derive(Debug, Clone, Default)]
pub struct DictObject {
    keys: Vec<QlObject>,
    values: Vec<QlObject>,
}

impl DictObject {
    pub fn new(keys: Vec<QlObject>, values: Vec<QlObject>) -> Self {
        Self { keys, values }
    }

    pub fn keys(&self) -> &[QlObject] {
        &self.keys
    }

    pub fn values(&self) -> &[QlObject] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key/value pairs in insertion order.
    ///
    /// # Panics
    ///
    /// If the key and value lists differ in length; the evaluator always
    /// builds them together.
    pub fn pairs(&self) -> impl Iterator<Item = (&QlObject, &QlObject)> {
        assert_eq!(
            self.keys.len(),
            self.values.len(),
            "dict keys and values must have the same length"
        );
        self.keys.iter().zip(self.values.iter())
    }
}

impl ObjectBehavior for DictObject {
    fn object_type(&self) -> ObjectType {
        ObjectType::Dict
    }
}
