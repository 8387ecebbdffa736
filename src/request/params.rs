//! Named parameter substitution.
//!
//! Caller text uses `@name` placeholders; ClickHouse binds `{name: Type}`.
//! Substitution is a single left-to-right pass over the text, so the result
//! does not depend on the order parameters were declared in.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::db::Params;
use crate::types::SqlType;

/// A value bound to a placeholder name.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub sql_type: SqlType,
    pub value: serde_json::Value,
}

/// Query text rewritten for server-side binding, plus the values to bind.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PreparedQuery {
    pub query: String,
    pub params: Params,
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@(\w+)").expect("placeholder pattern is valid"))
}

/// Rewrites every declared `@name` token into `{name: Type}`.
///
/// A token only matches as a whole identifier: `@id` inside `x@id` or the
/// prefix of `@idx` is left alone. Placeholders with no declared parameter stay
/// in the text for the server to reject. Every declared parameter is bound,
/// referenced or not. When a name is declared twice the later declaration wins.
pub fn prepare_query(query: &str, parameters: &[Parameter]) -> PreparedQuery {
    let declared: HashMap<&str, &Parameter> = parameters
        .iter()
        .map(|p| (p.name.as_str(), p))
        .collect();

    let rewritten = placeholder_regex().replace_all(query, |caps: &Captures<'_>| {
        let token = &caps[0];
        let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
        let preceded_by_word = query[..start]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_alphanumeric() || c == '_');

        match declared.get(&caps[1]) {
            Some(param) if !preceded_by_word => format!("{{{}: {}}}", param.name, param.sql_type),
            _ => token.to_string(),
        }
    });

    let params = parameters
        .iter()
        .map(|p| (p.name.clone(), p.value.clone()))
        .collect();

    PreparedQuery {
        query: rewritten.into_owned(),
        params,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn param(name: &str, sql_type: SqlType, value: serde_json::Value) -> Parameter {
        Parameter {
            name: name.to_string(),
            sql_type,
            value,
        }
    }

    #[rstest]
    fn test_rewrites_placeholder_and_binds_value() {
        let prepared = prepare_query(
            "SELECT * FROM users WHERE id = @id",
            &[param("id", SqlType::UInt32, json!(7))],
        );
        assert_eq!(prepared.query, "SELECT * FROM users WHERE id = {id: UInt32}");
        assert_eq!(prepared.params.get("id"), Some(&json!(7)));
    }

    #[rstest]
    fn test_rewrites_every_occurrence() {
        let prepared = prepare_query(
            "SELECT @x + @x",
            &[param("x", SqlType::Int64, json!(1))],
        );
        assert_eq!(prepared.query, "SELECT {x: Int64} + {x: Int64}");
    }

    #[rstest]
    fn test_longer_identifier_is_not_rewritten() {
        let prepared = prepare_query(
            "SELECT @name, @nameExtra",
            &[param("name", SqlType::String, json!("a"))],
        );
        assert_eq!(prepared.query, "SELECT {name: String}, @nameExtra");
    }

    #[rstest]
    fn test_placeholder_preceded_by_word_char_is_not_rewritten() {
        let prepared = prepare_query(
            "SELECT 'user@host', @host",
            &[param("host", SqlType::String, json!("db1"))],
        );
        assert_eq!(prepared.query, "SELECT 'user@host', {host: String}");
    }

    #[rstest]
    fn test_prefix_names_do_not_clash() {
        let prepared = prepare_query(
            "WHERE a = @id AND b = @id1 AND c = @id10",
            &[
                param("id1", SqlType::UInt8, json!(1)),
                param("id", SqlType::UInt8, json!(0)),
                param("id10", SqlType::UInt8, json!(10)),
            ],
        );
        assert_eq!(
            prepared.query,
            "WHERE a = {id: UInt8} AND b = {id1: UInt8} AND c = {id10: UInt8}"
        );
        assert_eq!(prepared.params.len(), 3);
    }

    #[rstest]
    fn test_declaration_order_does_not_matter() {
        let text = "SELECT @a, @b";
        let forward = prepare_query(
            text,
            &[param("a", SqlType::Int8, json!(1)), param("b", SqlType::String, json!("x"))],
        );
        let backward = prepare_query(
            text,
            &[param("b", SqlType::String, json!("x")), param("a", SqlType::Int8, json!(1))],
        );
        assert_eq!(forward, backward);
    }

    #[rstest]
    fn test_unused_parameter_is_still_bound() {
        let prepared = prepare_query("SELECT 1", &[param("unused", SqlType::String, json!("v"))]);
        assert_eq!(prepared.query, "SELECT 1");
        assert_eq!(prepared.params.get("unused"), Some(&json!("v")));
    }

    #[rstest]
    fn test_undeclared_placeholder_passes_through() {
        let prepared = prepare_query("SELECT @missing", &[]);
        assert_eq!(prepared.query, "SELECT @missing");
        assert!(prepared.params.is_empty());
    }

    #[rstest]
    fn test_later_declaration_wins() {
        let prepared = prepare_query(
            "SELECT @v",
            &[
                param("v", SqlType::Int8, json!(1)),
                param("v", SqlType::nullable(SqlType::String), json!(null)),
            ],
        );
        assert_eq!(prepared.query, "SELECT {v: Nullable(String)}");
        assert_eq!(prepared.params.get("v"), Some(&json!(null)));
    }

    #[rstest]
    fn test_decimal_binding() {
        let prepared = prepare_query(
            "INSERT INTO prices SELECT @price",
            &[param("price", SqlType::decimal(10, 2), json!("19.99"))],
        );
        assert_eq!(prepared.query, "INSERT INTO prices SELECT {price: Decimal(10,2)}");
    }
}
