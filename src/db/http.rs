//! ClickHouse HTTP interface backend.
//!
//! Queries travel in the POST body; bound parameters, settings and the target
//! database travel as URL parameters (`param_<name>=<text>`), which is how the
//! HTTP interface performs server-side binding.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use url::Url;

use super::backend::{
    CommandCall, CompactRows, Connection, DriverError, InsertCall, Params, QueryCall, Settings,
};
use super::config::ConnectionConfig;

/// Connection to a ClickHouse server over HTTP.
pub struct HttpConnection {
    client: Client,
    base: Url,
    username: Option<String>,
    password: Option<String>,
    database: Option<String>,
}

impl HttpConnection {
    /// Builds the HTTP client. Does not contact the server.
    pub fn new(config: &ConnectionConfig) -> Result<Self, DriverError> {
        let base = Url::parse(&config.url)
            .map_err(|e| DriverError::new(format!("Invalid ClickHouse URL '{}': {}", config.url, e)))?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| DriverError::new(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base,
            username: config.username.clone(),
            password: config.password.clone(),
            database: config.database.clone(),
        })
    }

    fn statement_url(&self, query: Option<&str>, params: &Params, settings: &Settings) -> Url {
        let mut url = self.base.clone();
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(database) = &self.database {
                pairs.append_pair("database", database);
            }
            if let Some(query) = query {
                pairs.append_pair("query", query);
            }
            for (name, value) in settings {
                pairs.append_pair(name, value);
            }
            for (name, value) in params {
                pairs.append_pair(&format!("param_{}", name), &param_value_text(value));
            }
        }
        url
    }

    async fn post(&self, url: Url, body: String) -> Result<String, DriverError> {
        let mut request = self.client.post(url).body(body);
        if let Some(user) = &self.username {
            request = request.header("X-ClickHouse-User", user);
        }
        if let Some(password) = &self.password {
            request = request.header("X-ClickHouse-Key", password);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DriverError::new(format!("ClickHouse request failed: {}", e)))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| DriverError::new(format!("Failed to read ClickHouse response: {}", e)))?;

        if status.is_success() {
            Ok(text)
        } else {
            Err(server_error(status.as_u16(), &text))
        }
    }
}

#[async_trait]
impl Connection for HttpConnection {
    async fn query(&self, call: QueryCall) -> Result<CompactRows, DriverError> {
        let mut settings = call.settings;
        settings.insert("default_format".to_string(), call.format.to_string());
        let url = self.statement_url(None, &call.params, &settings);
        let body = self.post(url, call.query).await?;
        parse_compact_rows(&body)
    }

    async fn command(&self, call: CommandCall) -> Result<(), DriverError> {
        let url = self.statement_url(None, &call.params, &call.settings);
        self.post(url, call.query).await?;
        Ok(())
    }

    async fn insert(&self, call: InsertCall) -> Result<(), DriverError> {
        let statement = insert_statement(&call.table, &call.columns, call.format);
        let url = self.statement_url(Some(&statement), &Params::new(), &call.settings);
        let mut body = String::new();
        for row in &call.rows {
            let line = serde_json::to_string(row)
                .map_err(|e| DriverError::new(format!("Failed to encode row: {}", e)))?;
            body.push_str(&line);
            body.push('\n');
        }
        self.post(url, body).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), DriverError> {
        let url = self
            .base
            .join("ping")
            .map_err(|e| DriverError::new(format!("Invalid ping URL: {}", e)))?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DriverError::new(format!("ClickHouse ping failed: {}", e)))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(server_error(status.as_u16(), &text))
        }
    }

    fn backend_name(&self) -> &'static str {
        "ClickHouseHttp"
    }
}

fn exception_code_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^Code:\s*(\d+)\.").expect("exception code pattern is valid"))
}

/// Turns an error response into a driver error, keeping the server's text.
fn server_error(status: u16, body: &str) -> DriverError {
    let message = body.trim();
    if message.is_empty() {
        return DriverError::new(format!("ClickHouse responded with HTTP {}", status));
    }
    let error = DriverError::new(message);
    match exception_code_regex()
        .captures(message)
        .and_then(|caps| caps[1].parse::<u32>().ok())
    {
        Some(code) => error.with_code(code),
        None => error,
    }
}

/// Parses a `JSONCompactEachRow*` body: one JSON array per line.
fn parse_compact_rows(body: &str) -> Result<CompactRows, DriverError> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str::<Vec<serde_json::Value>>(line)
                .map_err(|e| DriverError::new(format!("Failed to parse ClickHouse response: {}", e)))
        })
        .collect()
}

fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
}

fn insert_statement(table: &str, columns: &[String], format: &str) -> String {
    let columns = columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO {} ({}) FORMAT {}", table, columns, format)
}

/// Renders a parameter value in the text form ClickHouse parses for
/// `param_<name>` URL parameters.
fn param_value_text(value: &serde_json::Value) -> String {
    use serde_json::Value;
    match value {
        Value::Null => "\\N".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => escape_text(s),
        Value::Array(items) => {
            let inner = items.iter().map(nested_value_text).collect::<Vec<_>>().join(",");
            format!("[{}]", inner)
        }
        Value::Object(entries) => {
            let inner = entries
                .iter()
                .map(|(key, item)| format!("{}:{}", quote_literal(key), nested_value_text(item)))
                .collect::<Vec<_>>()
                .join(",");
            format!("{{{}}}", inner)
        }
    }
}

/// Top-level values are read in escaped text format.
fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\t' => escaped.push_str("\\t"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Values inside arrays and maps need quoting as ClickHouse literals.
fn nested_value_text(value: &serde_json::Value) -> String {
    use serde_json::Value;
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => quote_literal(s),
        other => param_value_text(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn connection() -> HttpConnection {
        let config = ConnectionConfig {
            database: Some("analytics".to_string()),
            ..ConnectionConfig::default()
        };
        HttpConnection::new(&config).unwrap()
    }

    #[rstest]
    #[case(json!(null), "\\N")]
    #[case(json!(true), "true")]
    #[case(json!(42), "42")]
    #[case(json!(-1.5), "-1.5")]
    #[case(json!("it's"), "it's")]
    #[case(json!([1, 2, 3]), "[1,2,3]")]
    #[case(json!(["a", "b'c"]), "['a','b\\'c']")]
    #[case(json!("C:\\new\tdir"), "C:\\\\new\\tdir")]
    #[case(json!("line\r\nnext\\"), "line\\r\\nnext\\\\")]
    #[case(json!({"k": "v", "n": 1}), "{'k':'v','n':1}")]
    #[case(json!({"path": "a\\b"}), "{'path':'a\\\\b'}")]
    fn test_param_value_text(#[case] value: serde_json::Value, #[case] expected: &str) {
        assert_eq!(param_value_text(&value), expected);
    }

    #[rstest]
    fn test_parse_compact_rows() {
        let body = "[\"id\",\"name\"]\n[\"UInt32\",\"String\"]\n[1,\"a\"]\n[2,\"b\"]\n";
        let rows = parse_compact_rows(body).unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[2], vec![json!(1), json!("a")]);
    }

    #[rstest]
    fn test_parse_compact_rows_rejects_garbage() {
        assert!(parse_compact_rows("not json\n").is_err());
    }

    #[rstest]
    fn test_server_error_extracts_code() {
        let err = server_error(400, "Code: 62. DB::Exception: Syntax error: failed at position 1\n");
        assert_eq!(err.code, Some(62));
        assert_eq!(err.message, "Code: 62. DB::Exception: Syntax error: failed at position 1");
    }

    #[rstest]
    fn test_server_error_empty_body() {
        let err = server_error(502, "  ");
        assert_eq!(err.code, None);
        assert_eq!(err.message, "ClickHouse responded with HTTP 502");
    }

    #[rstest]
    fn test_insert_statement_quotes_columns() {
        let columns = vec!["id".to_string(), "odd`name".to_string()];
        assert_eq!(
            insert_statement("events", &columns, "JSONEachRow"),
            "INSERT INTO events (`id`, `odd\\`name`) FORMAT JSONEachRow"
        );
    }

    #[rstest]
    fn test_statement_url_carries_params_and_settings() {
        let conn = connection();
        let mut params = Params::new();
        params.insert("id".to_string(), json!(5));
        let mut settings = Settings::new();
        settings.insert("date_time_input_format".to_string(), "best_effort".to_string());

        let url = conn.statement_url(None, &params, &settings);
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert!(pairs.contains(&("database".to_string(), "analytics".to_string())));
        assert!(pairs.contains(&("param_id".to_string(), "5".to_string())));
        assert!(pairs.contains(&(
            "date_time_input_format".to_string(),
            "best_effort".to_string()
        )));
        assert!(!pairs.iter().any(|(k, _)| k == "query"));
    }

    #[rstest]
    fn test_new_rejects_invalid_url() {
        let config = ConnectionConfig {
            url: "not a url".to_string(),
            ..ConnectionConfig::default()
        };
        assert!(HttpConnection::new(&config).is_err());
    }
}
