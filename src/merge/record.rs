use serde_json::{Map, Value};

/// One exported record. Exports usually wrap each record as `{ "<tag>": { ...fields } }`;
/// once flattened the tag is remembered so the record can be written back in the same shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    tag: Option<String>,
    body: Value,
}

impl Record {
    pub fn raw(value: Value) -> Self {
        Self {
            tag: None,
            body: value,
        }
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Unwrap a single-key `{ tag: {...} }` envelope. Records that already carry a tag,
    /// or whose body is not such an envelope, are left untouched.
    pub fn flatten(&mut self) {
        if self.tag.is_some() {
            return;
        }
        let Value::Object(outer) = &mut self.body else {
            return;
        };
        if outer.len() != 1 {
            return;
        }
        let is_envelope = outer.values().next().is_some_and(Value::is_object);
        if !is_envelope {
            return;
        }
        let Some((tag, inner)) = std::mem::take(outer).into_iter().next() else {
            return;
        };
        self.tag = Some(tag);
        self.body = inner;
    }

    pub fn fields(&self) -> Option<&Map<String, Value>> {
        self.body.as_object()
    }

    pub fn fields_mut(&mut self) -> Option<&mut Map<String, Value>> {
        self.body.as_object_mut()
    }

    pub fn field_str(&self, key: &str) -> Option<String> {
        match self.fields()?.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn into_value(self) -> Value {
        match self.tag {
            Some(tag) => {
                let mut outer = Map::new();
                outer.insert(tag, self.body);
                Value::Object(outer)
            }
            None => self.body,
        }
    }

    pub fn to_value(&self) -> Value {
        self.clone().into_value()
    }
}
