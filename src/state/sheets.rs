use async_trait::async_trait;
use reqwest::{Response, Url};
use serde::Deserialize;
use thiserror::Error;

pub type Rows = Vec<Vec<String>>;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("bad endpoint: {0}")]
    Endpoint(String),
}

/// Spreadsheet-like store addressed by A1 ranges (`State!A:B`).
#[async_trait]
pub trait TabularStore: Send + Sync {
    async fn read_range(&self, range: &str) -> Result<Rows, BackendError>;

    /// Overwrite the cells covered by `range`.
    async fn write_range(&self, range: &str, rows: Rows) -> Result<(), BackendError>;

    /// Add rows after the last non-empty row of `range`.
    async fn append_rows(&self, range: &str, rows: Rows) -> Result<(), BackendError>;
}

/// Google Sheets v4 `values` API.
pub struct SheetsClient {
    http: reqwest::Client,
    base: String,
    spreadsheet_id: String,
    token: String,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

impl SheetsClient {
    pub fn new(spreadsheet_id: impl Into<String>, token: impl Into<String>) -> Self {
        SheetsClient {
            http: reqwest::Client::new(),
            base: "https://sheets.googleapis.com/v4".to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            token: token.into(),
        }
    }

    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    fn values_url(&self, range: &str, suffix: &str) -> Result<Url, BackendError> {
        let mut url = Url::parse(&self.base).map_err(|e| BackendError::Endpoint(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| BackendError::Endpoint(self.base.clone()))?
            .pop_if_empty()
            .extend(["spreadsheets", self.spreadsheet_id.as_str(), "values"])
            .push(&format!("{}{}", range, suffix));
        Ok(url)
    }
}

async fn check(resp: Response) -> Result<Response, BackendError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(BackendError::Status {
        status: status.as_u16(),
        body,
    })
}

fn cell_text(cell: serde_json::Value) -> String {
    match cell {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Decode a `ValueRange` body into rows of text cells.
pub(crate) fn parse_value_range(body: &str) -> Result<Rows, BackendError> {
    let parsed: ValueRange =
        serde_json::from_str(body).map_err(|e| BackendError::Malformed(e.to_string()))?;
    Ok(parsed
        .values
        .into_iter()
        .map(|row| row.into_iter().map(cell_text).collect())
        .collect())
}

#[async_trait]
impl TabularStore for SheetsClient {
    async fn read_range(&self, range: &str) -> Result<Rows, BackendError> {
        let url = self.values_url(range, "")?;
        let resp = self.http.get(url).bearer_auth(&self.token).send().await?;
        let body = check(resp).await?.text().await?;
        parse_value_range(&body)
    }

    async fn write_range(&self, range: &str, rows: Rows) -> Result<(), BackendError> {
        let url = self.values_url(range, "")?;
        let body = serde_json::json!({ "range": range, "majorDimension": "ROWS", "values": rows });
        let resp = self
            .http
            .put(url)
            .bearer_auth(&self.token)
            .query(&[("valueInputOption", "RAW")])
            .json(&body)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn append_rows(&self, range: &str, rows: Rows) -> Result<(), BackendError> {
        let url = self.values_url(range, ":append")?;
        let body = serde_json::json!({ "range": range, "majorDimension": "ROWS", "values": rows });
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
            .json(&body)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_values_urls() {
        let client = SheetsClient::new("sheet-1", "tok").with_base_url("https://example.test/v4/");
        let url = client.values_url("State!A:B", "").unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.test/v4/spreadsheets/sheet-1/values/State!A:B"
        );
        let url = client.values_url("State!A:B", ":append").unwrap();
        assert!(url.as_str().ends_with("/values/State!A:B:append"));
    }

    #[test]
    fn rejects_unusable_base() {
        let client = SheetsClient::new("s", "t").with_base_url("not a url");
        assert!(matches!(
            client.values_url("State!A:B", ""),
            Err(BackendError::Endpoint(_))
        ));
    }

    #[test]
    fn parses_cells_as_text() {
        let rows = parse_value_range(
            r#"{"range":"State!A1:B3","majorDimension":"ROWS","values":[["last_run_date","2026-10-17"],["count",3],["empty"]]}"#,
        )
        .unwrap();
        assert_eq!(rows[0], vec!["last_run_date", "2026-10-17"]);
        assert_eq!(rows[1], vec!["count", "3"]);
        assert_eq!(rows[2], vec!["empty"]);
    }

    #[test]
    fn empty_sheet_has_no_values_field() {
        let rows = parse_value_range(r#"{"range":"State!A1:B1000","majorDimension":"ROWS"}"#).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            parse_value_range("<html>oops</html>"),
            Err(BackendError::Malformed(_))
        ));
    }
}
