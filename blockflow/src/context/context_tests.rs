//! Tests for the context type.

#[cfg(test)]
mod tests {
    use crate::context::Context;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_new_context_is_empty() {
        let ctx = Context::new();
        assert!(ctx.is_empty());
        assert_eq!(ctx.len(), 0);
    }

    #[test]
    fn test_insert_overwrites_and_returns_previous() {
        let mut ctx = Context::new();
        assert!(ctx.insert("x", json!(1)).is_none());
        assert_eq!(ctx.insert("x", json!(2)), Some(json!(1)));
        assert_eq!(ctx.get_i64("x"), Some(2));
    }

    #[test]
    fn test_typed_getters() {
        let ctx: Context = [
            ("count", json!(3)),
            ("ratio", json!(0.5)),
            ("label", json!("sales")),
        ]
        .into_iter()
        .collect();

        assert_eq!(ctx.get_i64("count"), Some(3));
        assert_eq!(ctx.get_f64("ratio"), Some(0.5));
        assert_eq!(ctx.get_str("label"), Some("sales"));
        assert_eq!(ctx.get_str("count"), None);
        assert!(ctx.get("missing").is_none());
    }

    #[test]
    fn test_from_value_rejects_non_objects() {
        assert!(Context::from_value(json!([1, 2, 3])).is_none());
        assert!(Context::from_value(json!("text")).is_none());

        let ctx = Context::from_value(json!({"a": true})).unwrap();
        assert!(ctx.contains_key("a"));
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let mut ctx = Context::new();
        ctx.insert("total", json!(2));

        let encoded = serde_json::to_string(&ctx).unwrap();
        assert_eq!(encoded, r#"{"total":2}"#);

        let decoded: Context = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, ctx);
    }

    #[test]
    fn test_display_is_json() {
        let ctx: Context = [("y", json!(2))].into_iter().collect();
        assert_eq!(ctx.to_string(), r#"{"y":2}"#);
    }
}
