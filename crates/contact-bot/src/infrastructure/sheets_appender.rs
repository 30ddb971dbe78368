use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::Url;
use serde_json::{json, Value};

use crate::domain::row_appender::{AppendError, RowAppender};

const SHEETS_API: &str = "https://sheets.googleapis.com";

/// Appends rows through the Google Sheets `values:append` endpoint.
///
/// Authentication is a pre-issued OAuth bearer token; minting one from a
/// service-account key is left to whoever launches the bot.
pub struct SheetsAppender {
    client: Client,
    url: Url,
    access_token: String,
}

impl SheetsAppender {
    pub fn new(spreadsheet_id: &str, worksheet: &str, access_token: String) -> Result<Self, AppendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppendError::Request(e.to_string()))?;
        Ok(Self {
            client,
            url: append_url(SHEETS_API, spreadsheet_id, worksheet)?,
            access_token,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl RowAppender for SheetsAppender {
    fn append_row(&mut self, row: &[String]) -> Result<(), AppendError> {
        let response = self
            .client
            .post(self.url.clone())
            .bearer_auth(&self.access_token)
            .json(&append_body(row))
            .send()
            .map_err(|e| AppendError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            log::debug!("Appended row to {}", self.url.path());
            return Ok(());
        }
        let body = response.text().unwrap_or_default();
        Err(AppendError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

/// `{base}/v4/spreadsheets/{id}/values/{worksheet}:append` with the query
/// options that insert a new row and store values verbatim.
pub fn append_url(base: &str, spreadsheet_id: &str, worksheet: &str) -> Result<Url, AppendError> {
    let mut url = Url::parse(base).map_err(|e| AppendError::Request(format!("invalid base url: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| AppendError::Request(format!("base url cannot have a path: {base}")))?
        .pop_if_empty()
        .extend([
            "v4",
            "spreadsheets",
            spreadsheet_id,
            "values",
            &format!("{worksheet}:append"),
        ]);
    url.query_pairs_mut()
        .append_pair("valueInputOption", "RAW")
        .append_pair("insertDataOption", "INSERT_ROWS");
    Ok(url)
}

pub fn append_body(row: &[String]) -> Value {
    json!({ "values": [row] })
}
