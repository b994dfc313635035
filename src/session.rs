//! Transactions and the HTTP client.
//!
//! A [`Transaction`] is an ordered list of [`Operation`]s serialized to the
//! node's `{"tx-ops": [...]}` wire format. [`XtdbClient`] wraps the node's
//! REST endpoints, and [`XtdbSession`] buffers operations on typed entities
//! until they are committed in one transaction.

// used to parse operation names
use std::str::FromStr;
use std::time::{Duration, Instant};
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::datalog::Clause;
use crate::error::{Result, XtdbError};
use crate::keys::{Direction, FindWhere};
use crate::orm::{Document, Entity, TxFunction, FN_FIELD};
use crate::query::Query;
use crate::settings::Settings;

/// Renders a time the way the node expects it: RFC 3339 with an explicit
/// `+00:00` offset, and microseconds only when there are any.
pub fn format_time(time: &DateTime<Utc>) -> String {
    let precision = if time.timestamp_subsec_micros() == 0 {
        SecondsFormat::Secs
    } else {
        SecondsFormat::Micros
    };
    time.to_rfc3339_opts(precision, false)
}

fn parse_time(value: &Value) -> Result<DateTime<Utc>> {
    let text = value
        .as_str()
        .ok_or_else(|| XtdbError::InvalidDocument(format!("expected a timestamp, found {value}")))?;
    DateTime::parse_from_rfc3339(text)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|e| XtdbError::InvalidDocument(format!("invalid timestamp {text}: {e}")))
}

// ------------- Operation -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    Put,
    Delete,
    Match,
    Evict,
    Fn,
}
impl OperationType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Put => "put",
            Self::Delete => "delete",
            Self::Match => "match",
            Self::Evict => "evict",
            Self::Fn => "fn",
        }
    }
}
impl FromStr for OperationType {
    type Err = XtdbError;
    fn from_str(name: &str) -> Result<Self> {
        match name {
            "put" => Ok(Self::Put),
            "delete" => Ok(Self::Delete),
            "match" => Ok(Self::Match),
            "evict" => Ok(Self::Evict),
            "fn" => Ok(Self::Fn),
            other => Err(XtdbError::InvalidDocument(format!("unknown operation {other}"))),
        }
    }
}
impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// What an operation applies to.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationValue {
    Document(Document),
    Id(String),
    Call { identifier: String, args: Vec<Value> },
}

/// One transaction operation. A missing valid time means "now", resolved
/// when the operation is serialized.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    kind: OperationType,
    value: OperationValue,
    valid_time: Option<DateTime<Utc>>,
}

impl Operation {
    pub fn put(document: Document, valid_time: Option<DateTime<Utc>>) -> Self {
        Self {
            kind: OperationType::Put,
            value: OperationValue::Document(document),
            valid_time,
        }
    }
    pub fn delete(id: impl Into<String>, valid_time: Option<DateTime<Utc>>) -> Self {
        Self {
            kind: OperationType::Delete,
            value: OperationValue::Id(id.into()),
            valid_time,
        }
    }
    /// Asserts that the stored document equals `document` at `valid_time`.
    pub fn match_(document: Document, valid_time: Option<DateTime<Utc>>) -> Self {
        Self {
            kind: OperationType::Match,
            value: OperationValue::Document(document),
            valid_time,
        }
    }
    pub fn evict(id: impl Into<String>, valid_time: Option<DateTime<Utc>>) -> Self {
        Self {
            kind: OperationType::Evict,
            value: OperationValue::Id(id.into()),
            valid_time,
        }
    }
    /// Invokes an installed transaction function.
    pub fn fn_(identifier: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            kind: OperationType::Fn,
            value: OperationValue::Call {
                identifier: identifier.into(),
                args,
            },
            valid_time: None,
        }
    }
    pub fn kind(&self) -> OperationType {
        self.kind
    }
    pub fn value(&self) -> &OperationValue {
        &self.value
    }
    pub fn valid_time(&self) -> Option<DateTime<Utc>> {
        self.valid_time
    }

    /// The wire form: `[op, doc, time]`, `["match", id, doc, time]`,
    /// `[op, id, time]` or `["fn", identifier, args...]`. Installing a
    /// transaction function (a put of a document holding `xt/fn`) carries
    /// no time.
    pub fn to_json(&self) -> Value {
        let time = || Value::String(format_time(&self.valid_time.unwrap_or_else(Utc::now)));
        let op = Value::String(self.kind.name().to_string());
        let items = match (&self.kind, &self.value) {
            (OperationType::Put, OperationValue::Document(document)) if document.contains(FN_FIELD) => {
                vec![op, document.clone().into()]
            }
            (OperationType::Match, OperationValue::Document(document)) => vec![
                op,
                Value::String(document.id().to_string()),
                document.clone().into(),
                time(),
            ],
            (_, OperationValue::Document(document)) => vec![op, document.clone().into(), time()],
            (_, OperationValue::Id(id)) => vec![op, Value::String(id.clone()), time()],
            (_, OperationValue::Call { identifier, args }) => {
                let mut items = vec![op, Value::String(identifier.clone())];
                items.extend(args.iter().cloned());
                items
            }
        };
        Value::Array(items)
    }

    pub fn from_json(value: &Value) -> Result<Self> {
        let items = value
            .as_array()
            .ok_or_else(|| XtdbError::InvalidDocument(format!("expected an operation list, found {value}")))?;
        let (name, rest) = items
            .split_first()
            .ok_or_else(|| XtdbError::InvalidDocument("empty operation".to_string()))?;
        let kind: OperationType = name
            .as_str()
            .ok_or_else(|| XtdbError::InvalidDocument(format!("expected an operation name, found {name}")))?
            .parse()?;
        let malformed = || XtdbError::InvalidDocument(format!("malformed {kind} operation {value}"));
        match (kind, rest) {
            (OperationType::Put, [document]) => Ok(Self::put(Document::try_from(document.clone())?, None)),
            (OperationType::Put, [document, time]) => Ok(Self::put(
                Document::try_from(document.clone())?,
                Some(parse_time(time)?),
            )),
            (OperationType::Match, [id, document, time]) => {
                let document = Document::try_from(document.clone())?;
                if id.as_str() != Some(document.id()) {
                    return Err(malformed());
                }
                Ok(Self::match_(document, Some(parse_time(time)?)))
            }
            (OperationType::Delete | OperationType::Evict, [id, time]) => {
                let id = id.as_str().ok_or_else(malformed)?.to_string();
                let time = Some(parse_time(time)?);
                Ok(if kind == OperationType::Delete {
                    Self::delete(id, time)
                } else {
                    Self::evict(id, time)
                })
            }
            (OperationType::Fn, [identifier, args @ ..]) => {
                let identifier = identifier.as_str().ok_or_else(malformed)?;
                Ok(Self::fn_(identifier, args.to_vec()))
            }
            _ => Err(malformed()),
        }
    }
}

// ------------- Transaction -------------
#[derive(Serialize)]
struct TxOps<'a> {
    #[serde(rename = "tx-ops")]
    tx_ops: &'a [Value],
}

#[derive(Deserialize)]
struct OwnedTxOps {
    #[serde(rename = "tx-ops")]
    tx_ops: Vec<Value>,
}

/// An ordered list of operations submitted atomically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transaction {
    operations: Vec<Operation>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn add(&mut self, operation: Operation) {
        self.operations.push(operation);
    }
    pub fn with(mut self, operation: Operation) -> Self {
        self.add(operation);
        self
    }
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }
    pub fn len(&self) -> usize {
        self.operations.len()
    }
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
    pub fn to_json(&self) -> Result<String> {
        let ops: Vec<Value> = self.operations.iter().map(Operation::to_json).collect();
        Ok(serde_json::to_string(&TxOps { tx_ops: &ops })?)
    }
    pub fn from_json(json: &str) -> Result<Self> {
        let parsed: OwnedTxOps = serde_json::from_str(json)?;
        let operations = parsed
            .tx_ops
            .iter()
            .map(Operation::from_json)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { operations })
    }
}

// ------------- Responses -------------
/// The node status, as reported by `GET /status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XtdbStatus {
    pub version: Option<String>,
    pub revision: Option<String>,
    pub index_version: Option<u64>,
    pub consumer_state: Option<Value>,
    pub kv_store: Option<String>,
    pub estimate_num_keys: Option<u64>,
    pub size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub tx_id: u64,
    pub tx_time: Option<String>,
}

// ------------- Request parameters -------------
/// The point in time a read is evaluated at; unset fields mean "latest".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeParams {
    pub valid_time: Option<DateTime<Utc>>,
    pub tx_time: Option<DateTime<Utc>>,
    pub tx_id: Option<u64>,
}
impl TimeParams {
    fn apply(&self, params: Params) -> Params {
        params
            .time("valid-time", self.valid_time)
            .time("tx-time", self.tx_time)
            .number("tx-id", self.tx_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryParams {
    pub sort_order: Direction,
    pub with_corrections: Option<bool>,
    pub with_docs: Option<bool>,
    pub start_valid_time: Option<DateTime<Utc>>,
    pub end_valid_time: Option<DateTime<Utc>>,
    pub start_tx_time: Option<DateTime<Utc>>,
    pub end_tx_time: Option<DateTime<Utc>>,
    pub start_tx_id: Option<u64>,
    pub end_tx_id: Option<u64>,
}
impl Default for HistoryParams {
    fn default() -> Self {
        Self {
            sort_order: Direction::Asc,
            with_corrections: None,
            with_docs: None,
            start_valid_time: None,
            end_valid_time: None,
            start_tx_time: None,
            end_tx_time: None,
            start_tx_id: None,
            end_tx_id: None,
        }
    }
}

#[derive(Debug, Default)]
struct Params(Vec<(&'static str, String)>);
impl Params {
    fn text(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.0.push((key, value.into()));
        self
    }
    fn time(self, key: &'static str, value: Option<DateTime<Utc>>) -> Self {
        match value {
            Some(time) => self.text(key, format_time(&time)),
            None => self,
        }
    }
    fn number(self, key: &'static str, value: Option<u64>) -> Self {
        match value {
            Some(number) => self.text(key, number.to_string()),
            None => self,
        }
    }
    fn flag(self, key: &'static str, value: Option<bool>) -> Self {
        match value {
            Some(flag) => self.text(key, flag.to_string()),
            None => self,
        }
    }
}

// ------------- Query text -------------
/// Anything that can be sent to the query endpoint.
pub trait QuerySource {
    fn query_text(&self) -> Result<String>;
}
impl QuerySource for str {
    fn query_text(&self) -> Result<String> {
        Ok(self.to_string())
    }
}
impl QuerySource for String {
    fn query_text(&self) -> Result<String> {
        Ok(self.clone())
    }
}
impl QuerySource for Query {
    fn query_text(&self) -> Result<String> {
        Ok(self.to_string())
    }
}
impl QuerySource for FindWhere {
    fn query_text(&self) -> Result<String> {
        Ok(self.to_string())
    }
}
/// Only complete queries (find-where trees) can be sent.
impl QuerySource for Clause {
    fn query_text(&self) -> Result<String> {
        if !self.is_terminal() {
            return Err(XtdbError::IncompleteQuery);
        }
        Ok(self.to_string())
    }
}

// ------------- XtdbClient -------------
/// A thin asynchronous client over the node's HTTP API.
#[derive(Debug, Clone)]
pub struct XtdbClient {
    base_url: String,
    client: Client,
}

impl XtdbClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, Some(Duration::from_secs(crate::settings::DEFAULT_TIMEOUT_SECONDS)))
    }
    pub fn with_timeout(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: builder.build()?,
        })
    }
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::with_timeout(settings.uri.clone(), settings.timeout_seconds.map(Duration::from_secs))
    }
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, path: &str, params: Params) -> RequestBuilder {
        self.client
            .get(format!("{}/{path}", self.base_url))
            .query(&params.0)
    }

    fn post(&self, path: &str, params: Params, content_type: &'static str, body: String) -> RequestBuilder {
        self.client
            .post(format!("{}/{path}", self.base_url))
            .query(&params.0)
            .header(CONTENT_TYPE, content_type)
            .body(body)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let request = request.header(ACCEPT, "application/json").build()?;
        let method = request.method().clone();
        let url = request.url().clone();
        let response = self.client.execute(request).await.inspect_err(|e| {
            warn!(%method, %url, error = %e, "request failed");
        })?;
        let status = response.status();
        debug!(%method, %url, status = status.as_u16(), "request complete");
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(%method, %url, status = status.as_u16(), %message, "request rejected");
            return Err(XtdbError::Http {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn json<T: serde::de::DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        Ok(self.send(request).await?.json().await?)
    }

    pub async fn status(&self) -> Result<XtdbStatus> {
        self.json(self.get("status", Params::default())).await
    }

    pub async fn get_entity(&self, eid: &str, time: &TimeParams) -> Result<Value> {
        let params = time.apply(Params::default().text("eid", eid));
        self.json(self.get("entity", params)).await
    }

    pub async fn get_entity_transactions(&self, eid: &str, time: &TimeParams) -> Result<Value> {
        let params = time.apply(Params::default().text("eid", eid));
        self.json(self.get("entity-tx", params)).await
    }

    pub async fn get_entity_history(&self, eid: &str, history: &HistoryParams) -> Result<Value> {
        let params = Params::default()
            .text("eid", eid)
            .text("history", "true")
            .text("sort-order", history.sort_order.keyword())
            .flag("with-corrections", history.with_corrections)
            .flag("with-docs", history.with_docs)
            .time("start-valid-time", history.start_valid_time)
            .time("end-valid-time", history.end_valid_time)
            .time("start-tx-time", history.start_tx_time)
            .time("end-tx-time", history.end_tx_time)
            .number("start-tx-id", history.start_tx_id)
            .number("end-tx-id", history.end_tx_id);
        self.json(self.get("entity", params)).await
    }

    pub async fn get_attribute_stats(&self) -> Result<Value> {
        self.json(self.get("attribute-stats", Params::default())).await
    }

    /// Waits until the node has indexed every submitted transaction.
    pub async fn sync(&self, timeout_ms: Option<u64>) -> Result<Value> {
        let params = Params::default().number("timeout", timeout_ms);
        self.json(self.get("sync", params)).await
    }

    /// Runs a complete query. An empty or non-JSON response body (the node
    /// answers that way when, say, an aggregate meets non-numeric data)
    /// fails with [`XtdbError::RemoteQuery`].
    pub async fn query<Q: QuerySource + ?Sized>(&self, query: &Q, time: &TimeParams) -> Result<Value> {
        let text = query.query_text()?;
        debug!(query = %text, "sending query");
        let started = Instant::now();
        let request = self.post("query", time.apply(Params::default()), "application/edn", text);
        let body = self.send(request).await?.text().await?;
        if body.trim().is_empty() {
            warn!("query returned an empty body");
            return Err(XtdbError::RemoteQuery("empty response body".to_string()));
        }
        let result: Value = serde_json::from_str(&body).map_err(|e| {
            warn!(error = %e, "query returned an invalid body");
            XtdbError::RemoteQuery(format!("invalid response body: {e}"))
        })?;
        info!(
            ms = started.elapsed().as_millis() as u64,
            rows = result.as_array().map_or(0, Vec::len),
            "query complete"
        );
        Ok(result)
    }

    pub async fn await_transaction(&self, tx_id: u64, timeout_ms: Option<u64>) -> Result<Value> {
        let params = Params::default()
            .number("tx-id", Some(tx_id))
            .number("timeout", timeout_ms);
        self.json(self.get("await-tx", params)).await
    }

    pub async fn await_transaction_time(&self, tx_time: &DateTime<Utc>, timeout_ms: Option<u64>) -> Result<Value> {
        let params = Params::default()
            .time("tx-time", Some(*tx_time))
            .number("timeout", timeout_ms);
        self.json(self.get("await-tx-time", params)).await
    }

    pub async fn get_transaction_log(&self, after_tx_id: Option<u64>, with_ops: Option<bool>) -> Result<Value> {
        let params = Params::default()
            .number("after-tx-id", after_tx_id)
            .flag("with-ops?", with_ops);
        self.json(self.get("tx-log", params)).await
    }

    /// Submits the transaction and waits until the node has indexed it.
    pub async fn submit_transaction(&self, transaction: &Transaction) -> Result<TransactionReceipt> {
        let body = transaction.to_json()?;
        let receipt: TransactionReceipt = self
            .json(self.post("submit-tx", Params::default(), "application/json", body))
            .await?;
        debug!(tx_id = receipt.tx_id, operations = transaction.len(), "transaction submitted");
        self.await_transaction(receipt.tx_id, None).await?;
        Ok(receipt)
    }

    pub async fn get_transaction_committed(&self, tx_id: u64) -> Result<Value> {
        let params = Params::default().number("tx-id", Some(tx_id));
        self.json(self.get("tx-committed", params)).await
    }

    pub async fn get_latest_completed_transaction(&self) -> Result<Value> {
        self.json(self.get("latest-completed-tx", Params::default())).await
    }

    pub async fn get_latest_submitted_transaction(&self) -> Result<Value> {
        self.json(self.get("latest-submitted-tx", Params::default())).await
    }

    pub async fn get_active_queries(&self) -> Result<Value> {
        self.json(self.get("active-queries", Params::default())).await
    }

    pub async fn get_recent_queries(&self) -> Result<Value> {
        self.json(self.get("recent-queries", Params::default())).await
    }

    pub async fn get_slowest_queries(&self) -> Result<Value> {
        self.json(self.get("slowest-queries", Params::default())).await
    }
}

// ------------- XtdbSession -------------
/// Buffers operations on typed entities and commits them as one transaction.
#[derive(Debug, Clone)]
pub struct XtdbSession {
    client: XtdbClient,
    transaction: Transaction,
}

impl XtdbSession {
    pub fn new(client: XtdbClient) -> Self {
        Self {
            client,
            transaction: Transaction::new(),
        }
    }
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(XtdbClient::from_settings(settings)?))
    }
    pub fn client(&self) -> &XtdbClient {
        &self.client
    }
    /// The operations buffered since the last commit.
    pub fn pending(&self) -> &Transaction {
        &self.transaction
    }

    /// Runs `query` and decodes every row as a `T`. Queries whose rows are
    /// no longer documents (aggregates) must go through [`XtdbClient::query`].
    pub async fn query<T: Entity>(&self, query: &Query, time: &TimeParams) -> Result<Vec<T>> {
        if !query.preserved_return_type() {
            return Err(XtdbError::UnsupportedOperation(
                "typed queries need the pulled result documents, use XtdbClient::query for aggregates"
                    .to_string(),
            ));
        }
        if query.result_type() != T::entity_type() {
            return Err(XtdbError::UnsupportedOperation(format!(
                "query returns {} documents, not {}",
                query.result_type(),
                T::entity_type()
            )));
        }
        let result = self.client.query(query, time).await?;
        let rows = result
            .as_array()
            .ok_or_else(|| XtdbError::RemoteQuery(format!("expected a list of rows, found {result}")))?;
        rows.iter()
            .map(|row| {
                let document = row
                    .get(0)
                    .cloned()
                    .ok_or_else(|| XtdbError::RemoteQuery(format!("empty row {row}")))?;
                T::from_document(&Document::try_from(document)?)
            })
            .collect()
    }

    pub async fn get(&self, id: &str, time: &TimeParams) -> Result<Value> {
        self.client.get_entity(id, time).await
    }

    pub fn put<T: Entity>(&mut self, entity: &T, valid_time: Option<DateTime<Utc>>) {
        self.transaction.add(Operation::put(entity.to_document(), valid_time));
    }
    pub fn delete<T: Entity>(&mut self, entity: &T, valid_time: Option<DateTime<Utc>>) {
        self.transaction.add(Operation::delete(entity.id(), valid_time));
    }
    pub fn match_<T: Entity>(&mut self, entity: &T, valid_time: Option<DateTime<Utc>>) {
        self.transaction.add(Operation::match_(entity.to_document(), valid_time));
    }
    pub fn evict<T: Entity>(&mut self, entity: &T, valid_time: Option<DateTime<Utc>>) {
        self.transaction.add(Operation::evict(entity.id(), valid_time));
    }
    /// Installs a transaction function.
    pub fn put_function(&mut self, function: &TxFunction) {
        self.transaction.add(Operation::put(function.to_document(), None));
    }
    pub fn fn_(&mut self, function: &TxFunction, args: Vec<Value>) {
        self.transaction.add(Operation::fn_(function.identifier(), args));
    }

    /// Submits the buffered operations. The buffer is emptied whether or
    /// not the submission succeeds; an empty buffer submits nothing.
    pub async fn commit(&mut self) -> Result<Option<TransactionReceipt>> {
        if self.transaction.is_empty() {
            return Ok(None);
        }
        let transaction = std::mem::take(&mut self.transaction);
        let receipt = self.client.submit_transaction(&transaction).await?;
        Ok(Some(receipt))
    }
}
