#![allow(dead_code)]

use async_trait::async_trait;
use flexmon::config::AppConfig;
use flexmon::flex::{RemoteResponse, StatementTransport, TransportError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub type Reply = Result<RemoteResponse, TransportError>;

pub const REFERENCE: &str = "1234567890";

pub fn accepted(reference: &str) -> Reply {
    Ok(RemoteResponse::ok(format!(
        "<FlexStatementResponse><Status>Success</Status><ReferenceCode>{}</ReferenceCode></FlexStatementResponse>",
        reference
    )))
}

pub fn refused(code: u32, message: &str) -> Reply {
    Ok(RemoteResponse::ok(format!(
        "<FlexStatementResponse><Status>Fail</Status><ErrorCode>{}</ErrorCode><ErrorMessage>{}</ErrorMessage></FlexStatementResponse>",
        code, message
    )))
}

pub fn not_ready() -> Reply {
    refused(1019, "Statement generation in progress. Please try again shortly.")
}

pub fn statement(trades: &[(&str, &str, f64)]) -> Reply {
    let rows: String = trades
        .iter()
        .map(|(symbol, date, pnl)| {
            format!(
                r#"<Trade symbol="{}" tradeDate="{}" quantity="10" tradePrice="100.5" ibCommission="-1" realizedPL="{}"/>"#,
                symbol, date, pnl
            )
        })
        .collect();
    Ok(RemoteResponse::ok(format!(
        r#"<FlexQueryResponse queryName="Trades" type="AF"><FlexStatements count="1"><FlexStatement accountId="U1"><Trades>{}</Trades></FlexStatement></FlexStatements></FlexQueryResponse>"#,
        rows
    )))
}

pub fn timed_out() -> Reply {
    Err(TransportError::Timeout("operation timed out".to_string()))
}

/// Transport replaying scripted replies; the last reply of each queue repeats.
#[derive(Default)]
pub struct ScriptedTransport {
    submits: Mutex<VecDeque<Reply>>,
    statements: Mutex<VecDeque<Reply>>,
    pub submit_calls: AtomicUsize,
    pub statement_calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_submit(self, reply: Reply) -> Self {
        self.submits.lock().unwrap().push_back(reply);
        self
    }

    pub fn on_statement(self, reply: Reply) -> Self {
        self.statements.lock().unwrap().push_back(reply);
        self
    }

    pub fn submits(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.statement_calls.load(Ordering::SeqCst)
    }

    fn next(queue: &Mutex<VecDeque<Reply>>) -> Reply {
        let mut queue = queue.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(TransportError::Request("no scripted reply".into())))
        }
    }
}

#[async_trait]
impl StatementTransport for ScriptedTransport {
    async fn send_request(&self, _query_id: &str, _token: &str) -> Reply {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        Self::next(&self.submits)
    }

    async fn get_statement(&self, _reference: &str, _token: &str) -> Reply {
        self.statement_calls.fetch_add(1, Ordering::SeqCst);
        Self::next(&self.statements)
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.flex.token = Some("test-token".to_string());
    config.flex.queries.trades = Some("111111".to_string());
    config.polling.max_wait_secs = 120;
    config
}
