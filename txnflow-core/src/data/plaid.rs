//! Plaid API client.
//!
//! Speaks Plaid's JSON-over-HTTPS contract with a blocking reqwest client.
//! Every request is a POST whose body carries `client_id` and `secret`.
//! Errors come back as a JSON body with `error_type`, `error_code` and
//! `error_message`; `PRODUCT_NOT_READY` is surfaced as its own variant so the
//! extractor can poll on it.

use super::api::{AggregationApi, ApiError};
use crate::domain::ReportingWindow;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;

pub const SANDBOX_HOST: &str = "https://sandbox.plaid.com";

/// Largest page `transactions/get` accepts.
const MAX_PAGE_SIZE: u32 = 500;

/// Tenant credentials for the API.
#[derive(Clone)]
pub struct PlaidCredentials {
    pub client_id: String,
    pub secret: String,
}

impl fmt::Debug for PlaidCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaidCredentials")
            .field("client_id", &self.client_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct PublicTokenResponse {
    public_token: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    access_token: String,
    #[serde(default)]
    item_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PlaidErrorBody {
    error_type: String,
    error_code: String,
    error_message: String,
}

/// Plaid API client.
pub struct PlaidClient {
    client: reqwest::blocking::Client,
    host: String,
    credentials: PlaidCredentials,
    page_size: u32,
}

impl PlaidClient {
    pub fn new(
        host: impl Into<String>,
        credentials: PlaidCredentials,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("txnflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            host: host.into().trim_end_matches('/').to_string(),
            credentials,
            page_size: MAX_PAGE_SIZE,
        })
    }

    /// Override the `transactions/get` page size (clamped to 1..=500).
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.host, path.trim_start_matches('/'))
    }

    /// POST `body` (with credentials injected) and decode the JSON response.
    fn post<T: DeserializeOwned>(&self, path: &str, mut body: Value) -> Result<T, ApiError> {
        if let Some(obj) = body.as_object_mut() {
            obj.insert("client_id".into(), json!(self.credentials.client_id));
            obj.insert("secret".into(), json!(self.credentials.secret));
        }

        let url = self.url(path);
        log::debug!("POST {url}");

        let resp = self.client.post(&url).json(&body).send().map_err(|e| {
            if e.is_timeout() {
                ApiError::Network(format!("timeout calling {path}: {e}"))
            } else {
                ApiError::Network(e.to_string())
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            return Err(decode_error(status.as_u16(), &text));
        }

        resp.json::<T>().map_err(|e| {
            ApiError::ResponseFormat(format!("failed to parse {path} response: {e}"))
        })
    }

    fn transactions_page(
        &self,
        access_token: &str,
        window: &ReportingWindow,
        offset: usize,
    ) -> Result<Value, ApiError> {
        self.post(
            "transactions/get",
            json!({
                "access_token": access_token,
                "start_date": window.start_date.format("%Y-%m-%d").to_string(),
                "end_date": window.end_date.format("%Y-%m-%d").to_string(),
                "options": { "count": self.page_size, "offset": offset },
            }),
        )
    }
}

impl AggregationApi for PlaidClient {
    fn name(&self) -> &str {
        "plaid"
    }

    fn create_sandbox_public_token(
        &self,
        institution_id: &str,
        products: &[String],
    ) -> Result<String, ApiError> {
        let resp: PublicTokenResponse = self
            .post(
                "sandbox/public_token/create",
                json!({ "institution_id": institution_id, "initial_products": products }),
            )
            .map_err(|e| e.into_auth_setup("sandbox public token create"))?;
        Ok(resp.public_token)
    }

    fn exchange_public_token(&self, public_token: &str) -> Result<String, ApiError> {
        let resp: ExchangeResponse = self
            .post(
                "item/public_token/exchange",
                json!({ "public_token": public_token }),
            )
            .map_err(|e| e.into_auth_setup("public token exchange"))?;
        if let Some(item_id) = &resp.item_id {
            log::debug!("linked item {item_id}");
        }
        Ok(resp.access_token)
    }

    fn get_transactions(
        &self,
        access_token: &str,
        window: &ReportingWindow,
    ) -> Result<Value, ApiError> {
        collect_pages(|offset| self.transactions_page(access_token, window, offset))
    }
}

/// Fetch the first page, then keep requesting from `offset = collected` until
/// `total_transactions` is reached. A response without a total is a single
/// page; an empty follow-up page stops early.
pub(crate) fn collect_pages<F>(mut fetch: F) -> Result<Value, ApiError>
where
    F: FnMut(usize) -> Result<Value, ApiError>,
{
    let mut doc = fetch(0)?;
    let total = doc
        .get("total_transactions")
        .and_then(Value::as_u64)
        .map(|t| t as usize);
    let mut collected = transaction_count(&doc)?;

    while let Some(total) = total {
        if collected >= total {
            break;
        }
        let added = merge_page(&mut doc, fetch(collected)?)?;
        if added == 0 {
            log::warn!("transactions/get returned an empty page at offset {collected} of {total}");
            break;
        }
        collected += added;
    }

    Ok(doc)
}

/// Turn a non-2xx response into an [`ApiError`].
pub(crate) fn decode_error(status: u16, body: &str) -> ApiError {
    let parsed: PlaidErrorBody = serde_json::from_str(body).unwrap_or_default();
    if parsed.error_code == "PRODUCT_NOT_READY" {
        return ApiError::ProductNotReady;
    }
    let code = if parsed.error_code.is_empty() {
        "UNKNOWN".to_string()
    } else if parsed.error_type.is_empty() {
        parsed.error_code
    } else {
        format!("{}/{}", parsed.error_type, parsed.error_code)
    };
    let message = if parsed.error_message.is_empty() {
        body.chars().take(200).collect()
    } else {
        parsed.error_message
    };
    ApiError::Request {
        status,
        code,
        message,
    }
}

fn transaction_count(doc: &Value) -> Result<usize, ApiError> {
    doc.get("transactions")
        .and_then(Value::as_array)
        .map(Vec::len)
        .ok_or_else(|| ApiError::ResponseFormat("`transactions` array missing".into()))
}

/// Append the transactions of a follow-up page to the first page's document.
///
/// Returns how many transactions were appended.
pub(crate) fn merge_page(doc: &mut Value, page: Value) -> Result<usize, ApiError> {
    let Value::Object(mut page) = page else {
        return Err(ApiError::ResponseFormat("page is not an object".into()));
    };
    let Some(Value::Array(more)) = page.remove("transactions") else {
        return Err(ApiError::ResponseFormat(
            "`transactions` array missing from page".into(),
        ));
    };
    let target = doc
        .get_mut("transactions")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| ApiError::ResponseFormat("`transactions` array missing".into()))?;
    let added = more.len();
    target.extend(more);
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_not_ready_is_its_own_variant() {
        let body = r#"{"error_type":"ITEM_ERROR","error_code":"PRODUCT_NOT_READY","error_message":"the requested product is not yet ready"}"#;
        assert!(matches!(decode_error(400, body), ApiError::ProductNotReady));
    }

    #[test]
    fn plaid_error_body_decoded() {
        let body = r#"{"error_type":"INVALID_INPUT","error_code":"INVALID_API_KEYS","error_message":"invalid client_id or secret provided","request_id":"abc"}"#;
        match decode_error(400, body) {
            ApiError::Request {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 400);
                assert_eq!(code, "INVALID_INPUT/INVALID_API_KEYS");
                assert_eq!(message, "invalid client_id or secret provided");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_json_error_body_kept_as_message() {
        match decode_error(502, "Bad Gateway") {
            ApiError::Request { code, message, .. } => {
                assert_eq!(code, "UNKNOWN");
                assert_eq!(message, "Bad Gateway");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn request_error_relabelled_as_auth_setup() {
        let err = decode_error(400, r#"{"error_code":"INVALID_INSTITUTION"}"#)
            .into_auth_setup("sandbox public token create");
        assert!(matches!(err, ApiError::AuthSetup { .. }));
        assert!(err.to_string().contains("INVALID_INSTITUTION"));
    }

    #[test]
    fn pages_are_merged() {
        let mut doc = json!({"transactions": [{"transaction_id": "t1"}], "total_transactions": 3});
        let added = merge_page(
            &mut doc,
            json!({"transactions": [{"transaction_id": "t2"}, {"transaction_id": "t3"}]}),
        )
        .unwrap();
        assert_eq!(added, 2);
        assert_eq!(transaction_count(&doc).unwrap(), 3);
        assert_eq!(doc["transactions"][2]["transaction_id"], "t3");
    }

    fn page(ids: &[&str], total: Option<u64>) -> Value {
        let transactions: Vec<Value> = ids.iter().map(|id| json!({"transaction_id": id})).collect();
        let mut doc = json!({"accounts": [{"account_id": "a1"}], "transactions": transactions});
        if let Some(total) = total {
            doc["total_transactions"] = json!(total);
        }
        doc
    }

    fn ids(doc: &Value) -> Vec<&str> {
        doc["transactions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["transaction_id"].as_str().unwrap())
            .collect()
    }

    #[test]
    fn pagination_follows_collected_offset() {
        let mut offsets = Vec::new();
        let doc = collect_pages(|offset| {
            offsets.push(offset);
            Ok(match offset {
                0 => page(&["t1", "t2"], Some(5)),
                2 => page(&["t3", "t4"], Some(5)),
                _ => page(&["t5"], Some(5)),
            })
        })
        .unwrap();

        assert_eq!(offsets, vec![0, 2, 4]);
        assert_eq!(ids(&doc), vec!["t1", "t2", "t3", "t4", "t5"]);
        // first page's envelope is kept
        assert_eq!(doc["total_transactions"], 5);
        assert_eq!(doc["accounts"][0]["account_id"], "a1");
    }

    #[test]
    fn pagination_stops_on_empty_page() {
        let mut calls = 0;
        let doc = collect_pages(|offset| {
            calls += 1;
            Ok(if offset == 0 {
                page(&["t1"], Some(10))
            } else {
                page(&[], Some(10))
            })
        })
        .unwrap();

        assert_eq!(calls, 2);
        assert_eq!(ids(&doc), vec!["t1"]);
    }

    #[test]
    fn pagination_without_total_is_one_page() {
        let mut offsets = Vec::new();
        let doc = collect_pages(|offset| {
            offsets.push(offset);
            Ok(page(&["t1", "t2"], None))
        })
        .unwrap();

        assert_eq!(offsets, vec![0]);
        assert_eq!(ids(&doc), vec!["t1", "t2"]);
    }

    #[test]
    fn pagination_error_on_follow_up_page_propagates() {
        let err = collect_pages(|offset| {
            if offset == 0 {
                Ok(page(&["t1"], Some(2)))
            } else {
                Err(ApiError::Network("connection reset".into()))
            }
        })
        .unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
    }

    #[test]
    fn credentials_debug_redacts_secret() {
        let creds = PlaidCredentials {
            client_id: "client".into(),
            secret: "hunter2".into(),
        };
        let shown = format!("{creds:?}");
        assert!(shown.contains("client"));
        assert!(!shown.contains("hunter2"));
    }

    #[test]
    fn url_joins_host_and_path() {
        let client = PlaidClient::new(
            "https://sandbox.plaid.com/",
            PlaidCredentials {
                client_id: "c".into(),
                secret: "s".into(),
            },
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            client.url("/transactions/get"),
            "https://sandbox.plaid.com/transactions/get"
        );
    }
}
