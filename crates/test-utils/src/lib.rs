//! Sift test utilities.
//!
//! A shop model fixture, JSON builders for search requests, and assertion
//! helpers for rendered SQL.

use serde_json::{Map, Value, json};

/// Users, orders, order lines and products.
pub const SHOP_MODELS: &str = r#"
models:
  - name: User
    table: users
    fields: [id, name, email, active, { name: createdAt, column: created_at }]
    relationships:
      - { name: orders, target: Order, local: id, remote: user_id, kind: many }
  - name: Order
    table: orders
    fields: [id, user_id, total, status, created_at]
    relationships:
      - { name: user, target: User, local: user_id, remote: id, kind: one }
      - { name: items, target: OrderItem, local: id, remote: order_id, kind: many }
  - name: OrderItem
    table: order_items
    fields: [id, order_id, product_id, quantity, price]
    relationships:
      - { name: product, target: Product, local: product_id, remote: id, kind: one }
  - name: Product
    table: products
    fields: [id, name, sku, price, category]
"#;

/// An operator node.
pub fn op(field: impl Into<Value>, op: &str, value: impl Into<Value>) -> Value {
    json!({"field": field.into(), "op": op, "value": value.into()})
}

/// An operator node with parameters.
pub fn op_with(field: impl Into<Value>, op: &str, value: impl Into<Value>, param: Value) -> Value {
    json!({"field": field.into(), "op": op, "value": value.into(), "param": param})
}

/// A function node over one or more fields.
pub fn func(name: &str, field: impl Into<Value>) -> Value {
    json!({"fn": name, "field": field.into()})
}

/// A function node with parameters.
pub fn func_with(name: &str, field: impl Into<Value>, param: Value) -> Value {
    json!({"fn": name, "field": field.into(), "param": param})
}

/// A positional filter tree `[a, connector, b]`.
pub fn tree(a: Value, connector: &str, b: Value) -> Value {
    json!([a, connector, b])
}

/// A search request builder.
#[derive(Debug, Clone, Default)]
pub struct SearchBuilder {
    body: Map<String, Value>,
}

/// Start a request selecting `query`.
pub fn search(query: impl Into<Value>) -> SearchBuilder {
    SearchBuilder::default().with("query", query.into())
}

impl SearchBuilder {
    fn with(mut self, key: &str, value: Value) -> Self {
        self.body.insert(key.to_string(), value);
        self
    }

    /// Append a join; repeated calls accumulate.
    pub fn join(mut self, join: Value) -> Self {
        match self.body.get_mut("join") {
            Some(Value::Array(joins)) => joins.push(join),
            _ => {
                self.body.insert("join".to_string(), json!([join]));
            }
        }
        self
    }

    pub fn filter_by(self, filter: Value) -> Self {
        self.with("filter_by", filter)
    }

    pub fn group_by(self, group_by: impl Into<Value>) -> Self {
        self.with("group_by", group_by.into())
    }

    pub fn having(self, having: Value) -> Self {
        self.with("having", having)
    }

    pub fn order_by(self, order_by: impl Into<Value>) -> Self {
        self.with("order_by", order_by.into())
    }

    pub fn page(self, page: u64) -> Self {
        self.with("page", json!(page))
    }

    pub fn page_size(self, page_size: u64) -> Self {
        self.with("page_size", json!(page_size))
    }

    pub fn build(self) -> Value {
        Value::Object(self.body)
    }
}

/// Assertion helpers for JSON and rendered SQL.
pub mod assert {
    use serde_json::Value;

    /// Assert that a JSON value has a specific key.
    pub fn has_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_some(),
            "Expected JSON to have key '{key}', got: {value}"
        );
    }

    /// Assert that a string contains a substring.
    pub fn contains(haystack: &str, needle: &str) {
        assert!(
            haystack.contains(needle),
            "Expected string to contain '{needle}'\nActual: {haystack}"
        );
    }

    /// Assert that a string does not contain a substring.
    pub fn not_contains(haystack: &str, needle: &str) {
        assert!(
            !haystack.contains(needle),
            "Expected string to NOT contain '{needle}'\nActual: {haystack}"
        );
    }

    /// Assert that `needles` occur in `haystack` in the given order.
    pub fn in_order(haystack: &str, needles: &[&str]) {
        let mut rest = haystack;
        for needle in needles {
            match rest.find(needle) {
                Some(at) => rest = &rest[at + needle.len()..],
                None => panic!("Expected '{needle}' in order\nActual: {haystack}"),
            }
        }
    }
}
