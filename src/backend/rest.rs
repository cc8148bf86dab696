use serde_json::Value;
use tracing::debug;

use super::{BackendError, Filter, Query, Row, Table, TableStore};

/// PostgREST-compatible hosted table store (`/rest/v1/<table>`).
pub struct RestTableStore {
    base_url: String,
    anon_key: String,
    access_token: Option<String>,
    agent: ureq::Agent,
}

impl RestTableStore {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            access_token: None,
            agent: ureq::Agent::new(),
        }
    }

    fn table_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table.name())
    }

    fn request(&self, method: &str, url: &str) -> ureq::Request {
        let bearer = self.access_token.as_deref().unwrap_or(&self.anon_key);
        self.agent
            .request(method, url)
            .set("apikey", &self.anon_key)
            .set("Authorization", &format!("Bearer {bearer}"))
            .set("Content-Type", "application/json")
    }

    fn send(&self, req: ureq::Request, body: Option<String>) -> Result<Response, BackendError> {
        let result = match body {
            Some(b) => req.send_string(&b),
            None => req.call(),
        };
        match result {
            Ok(resp) => {
                let text = resp
                    .into_string()
                    .map_err(|e| BackendError::Transport(e.to_string()))?;
                Ok(Response { text })
            }
            Err(ureq::Error::Status(status, resp)) => {
                let message = resp
                    .into_string()
                    .ok()
                    .and_then(|t| error_message(&t))
                    .unwrap_or_else(|| "request rejected".to_string());
                Err(BackendError::Http { status, message })
            }
            Err(e) => Err(BackendError::Transport(e.to_string())),
        }
    }
}

struct Response {
    text: String,
}

impl Response {
    fn rows(&self) -> Result<Vec<Row>, BackendError> {
        if self.text.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&self.text)?)
    }
}

/// Pulls the `message` out of a PostgREST/GoTrue error body.
pub(crate) fn error_message(body: &str) -> Option<String> {
    let v: Value = serde_json::from_str(body).ok()?;
    ["message", "msg", "error_description", "error"]
        .iter()
        .find_map(|k| v.get(*k).and_then(|m| m.as_str()).map(str::to_string))
}

fn literal(v: &Value) -> String {
    match v {
        Value::String(s) => {
            if s.contains([',', '(', ')', '"']) {
                format!("\"{}\"", s.replace('"', "\\\""))
            } else {
                s.clone()
            }
        }
        other => other.to_string(),
    }
}

/// PostgREST query parameters for a set of filters.
pub(crate) fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|f| match f {
            Filter::Eq(col, Value::Null) => ((*col).to_string(), "is.null".to_string()),
            Filter::Eq(col, v) => ((*col).to_string(), format!("eq.{}", literal(v))),
            Filter::In(col, vs) => {
                let items: Vec<String> = vs.iter().map(literal).collect();
                ((*col).to_string(), format!("in.({})", items.join(",")))
            }
        })
        .collect()
}

pub(crate) fn query_params(query: &Query) -> Vec<(String, String)> {
    let mut out = filter_params(&query.filters);
    if !query.order.is_empty() {
        let keys: Vec<String> = query
            .order
            .iter()
            .map(|(c, asc)| format!("{c}.{}", if *asc { "asc" } else { "desc" }))
            .collect();
        out.push(("order".to_string(), keys.join(",")));
    }
    if let Some(n) = query.limit {
        out.push(("limit".to_string(), n.to_string()));
    }
    out
}

fn apply_params(mut req: ureq::Request, params: &[(String, String)]) -> ureq::Request {
    for (k, v) in params {
        req = req.query(k, v);
    }
    req
}

impl TableStore for RestTableStore {
    fn label(&self) -> &'static str {
        "rest"
    }

    fn insert(&mut self, table: Table, rows: Vec<Row>) -> Result<(), BackendError> {
        if rows.is_empty() {
            return Ok(());
        }
        // One bulk POST commits or fails as a whole.
        let body = serde_json::to_string(&rows)?;
        let req = self
            .request("POST", &self.table_url(table))
            .set("Prefer", "return=minimal");
        debug!(table = table.name(), rows = rows.len(), "rest insert");
        self.send(req, Some(body))?;
        Ok(())
    }

    fn select(&mut self, table: Table, query: &Query) -> Result<Vec<Row>, BackendError> {
        let mut params = vec![("select".to_string(), table.columns().join(","))];
        params.extend(query_params(query));
        let req = apply_params(self.request("GET", &self.table_url(table)), &params);
        self.send(req, None)?.rows()
    }

    fn update(
        &mut self,
        table: Table,
        filters: &[Filter],
        patch: Row,
    ) -> Result<usize, BackendError> {
        if filters.is_empty() {
            return Err(BackendError::Unfiltered("update"));
        }
        let req = apply_params(
            self.request("PATCH", &self.table_url(table))
                .set("Prefer", "return=representation"),
            &filter_params(filters),
        );
        let body = serde_json::to_string(&patch)?;
        Ok(self.send(req, Some(body))?.rows()?.len())
    }

    fn delete(&mut self, table: Table, filters: &[Filter]) -> Result<usize, BackendError> {
        if filters.is_empty() {
            return Err(BackendError::Unfiltered("delete"));
        }
        let req = apply_params(
            self.request("DELETE", &self.table_url(table))
                .set("Prefer", "return=representation"),
            &filter_params(filters),
        );
        Ok(self.send(req, None)?.rows()?.len())
    }

    fn set_access_token(&mut self, token: Option<String>) {
        self.access_token = token;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filters_render_as_postgrest_operators() {
        let params = filter_params(&[
            Filter::eq("classroom_id", "c1"),
            Filter::any_of("id", ["a", "b"]),
            Filter::Eq("batch_id", Value::Null),
        ]);
        assert_eq!(
            params,
            vec![
                ("classroom_id".to_string(), "eq.c1".to_string()),
                ("id".to_string(), "in.(a,b)".to_string()),
                ("batch_id".to_string(), "is.null".to_string()),
            ]
        );
    }

    #[test]
    fn query_adds_order_and_limit() {
        let q = Query::new()
            .filter(Filter::eq("points", 2))
            .order_desc("created_at")
            .order_asc("id")
            .limit(5);
        let params = query_params(&q);
        assert!(params.contains(&("points".to_string(), "eq.2".to_string())));
        assert!(params.contains(&("order".to_string(), "created_at.desc,id.asc".to_string())));
        assert!(params.contains(&("limit".to_string(), "5".to_string())));
    }

    #[test]
    fn reserved_characters_are_quoted() {
        let params = filter_params(&[Filter::eq("name", "Smith, J")]);
        assert_eq!(params[0].1, "eq.\"Smith, J\"");
    }

    #[test]
    fn error_message_reads_common_fields() {
        assert_eq!(
            error_message(&json!({ "message": "JWT expired" }).to_string()).as_deref(),
            Some("JWT expired")
        );
        assert_eq!(
            error_message(&json!({ "error_description": "Invalid login credentials" }).to_string())
                .as_deref(),
            Some("Invalid login credentials")
        );
        assert_eq!(error_message("not json"), None);
    }
}
