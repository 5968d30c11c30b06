//! Status envelopes of the statement service.
//!
//! Both protocol operations answer HTTP 200 for most failures and carry the
//! real outcome in `<Status>`, `<ErrorCode>` and `<ErrorMessage>` elements.

use roxmltree::{Document, Node};

use super::parser;
use super::transport::{RemoteResponse, TransportError};
use crate::domain::RecordSet;

/// Result of a `SendRequest` call
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Accepted { reference: String },
    Rejected { message: String },
}

/// Classification of one `GetStatement` attempt
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Statement generated and parsed
    Ready(RecordSet),
    /// Accepted but still generating
    NotReady(String),
    /// 5xx, 408, connect or timeout failure
    Retryable(String),
    /// Anything else; never retried
    Fatal(String),
}

fn child_text<'a>(root: Node<'a, 'a>, tag: &str) -> Option<&'a str> {
    root.descendants()
        .find(|n| n.is_element() && n.tag_name().name() == tag)
        .map(|n| n.text().unwrap_or("").trim())
}

fn error_text(root: Node<'_, '_>, code: Option<&str>) -> String {
    let code = code.filter(|c| !c.is_empty()).unwrap_or("Unknown");
    let message = child_text(root, "ErrorMessage")
        .filter(|m| !m.is_empty())
        .unwrap_or("Unknown error");
    format!("Error {}: {}", code, message)
}

fn http_failure(response: &RemoteResponse) -> String {
    format!("HTTP {}: {}", response.status, response.body.trim())
}

/// Interpret the body of a `SendRequest` reply
pub fn parse_submit_response(response: &RemoteResponse) -> SubmitOutcome {
    if !(200..300).contains(&response.status) {
        return SubmitOutcome::Rejected {
            message: http_failure(response),
        };
    }

    let doc = match Document::parse(&response.body) {
        Ok(doc) => doc,
        Err(e) => {
            return SubmitOutcome::Rejected {
                message: format!("Invalid response format: {}", e),
            }
        }
    };
    let root = doc.root_element();

    let Some(status) = child_text(root, "Status") else {
        return SubmitOutcome::Rejected {
            message: "Invalid response format: no Status element".to_string(),
        };
    };

    if status != "Success" {
        return SubmitOutcome::Rejected {
            message: error_text(root, child_text(root, "ErrorCode")),
        };
    }

    match child_text(root, "ReferenceCode").filter(|r| !r.is_empty()) {
        Some(reference) => SubmitOutcome::Accepted {
            reference: reference.to_string(),
        },
        None => SubmitOutcome::Rejected {
            message: "No reference code in response".to_string(),
        },
    }
}

/// Error embedded in a statement document, if any.
///
/// A non-zero `<ErrorCode>` is an error; so is a `<Status>` other than
/// `Success` when present. Generated statements carry neither.
pub fn statement_error(doc: &Document<'_>) -> Option<String> {
    let root = doc.root_element();
    let code = child_text(root, "ErrorCode");

    if let Some(code) = code {
        if code != "0" {
            return Some(error_text(root, Some(code)));
        }
        return None;
    }

    match child_text(root, "Status") {
        Some(status) if status != "Success" => Some(error_text(root, None)),
        _ => None,
    }
}

/// Matches "still generating" messages against a fixed phrase list
#[derive(Debug, Clone)]
pub struct ResponseClassifier {
    phrases: Vec<String>,
}

impl ResponseClassifier {
    pub fn new<S: AsRef<str>>(phrases: &[S]) -> Self {
        Self {
            phrases: phrases
                .iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Case-insensitive phrase match
    pub fn is_not_ready(&self, message: &str) -> bool {
        let message = message.to_lowercase();
        self.phrases.iter().any(|phrase| message.contains(phrase))
    }

    /// Classify one fetch attempt for `reference`
    pub fn classify(
        &self,
        reference: &str,
        result: std::result::Result<RemoteResponse, TransportError>,
    ) -> FetchOutcome {
        let response = match result {
            Ok(response) => response,
            Err(e) if e.is_retryable() => return FetchOutcome::Retryable(e.to_string()),
            Err(e) => return FetchOutcome::Fatal(e.to_string()),
        };

        if response.status >= 500 || response.status == 408 {
            return FetchOutcome::Retryable(http_failure(&response));
        }
        if !(200..300).contains(&response.status) {
            return FetchOutcome::Fatal(http_failure(&response));
        }

        let doc = match Document::parse(&response.body) {
            Ok(doc) => doc,
            Err(e) => return FetchOutcome::Fatal(format!("Malformed statement: {}", e)),
        };

        if let Some(error) = statement_error(&doc) {
            if self.is_not_ready(&error) {
                return FetchOutcome::NotReady(error);
            }
            return FetchOutcome::Fatal(error);
        }

        FetchOutcome::Ready(parser::parse_document(&doc).with_reference(reference))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PollingConfig;

    fn classifier() -> ResponseClassifier {
        ResponseClassifier::new(&PollingConfig::default().not_ready_phrases)
    }

    #[test]
    fn test_submit_success_extracts_reference() {
        let body = r#"<FlexStatementResponse timestamp="28 August, 2024 10:37 AM EDT">
            <Status>Success</Status>
            <ReferenceCode>1234567890</ReferenceCode>
            <Url>https://gdcdyn.interactivebrokers.com/Universal/servlet/FlexStatementService.GetStatement</Url>
        </FlexStatementResponse>"#;

        assert_eq!(
            parse_submit_response(&RemoteResponse::ok(body)),
            SubmitOutcome::Accepted {
                reference: "1234567890".to_string()
            }
        );
    }

    #[test]
    fn test_submit_failure_in_body_despite_http_200() {
        let body = r#"<FlexStatementResponse>
            <Status>Fail</Status>
            <ErrorCode>1020</ErrorCode>
            <ErrorMessage>Invalid request or unable to validate request.</ErrorMessage>
        </FlexStatementResponse>"#;

        assert_eq!(
            parse_submit_response(&RemoteResponse::ok(body)),
            SubmitOutcome::Rejected {
                message: "Error 1020: Invalid request or unable to validate request.".to_string()
            }
        );
    }

    #[test]
    fn test_submit_without_reference_is_rejected() {
        let body = "<FlexStatementResponse><Status>Success</Status></FlexStatementResponse>";
        assert!(matches!(
            parse_submit_response(&RemoteResponse::ok(body)),
            SubmitOutcome::Rejected { .. }
        ));
    }

    #[test]
    fn test_not_ready_phrase_is_case_insensitive() {
        let body = r#"<FlexStatementResponse>
            <Status>Warn</Status>
            <ErrorCode>1019</ErrorCode>
            <ErrorMessage>Statement generation in progress. Please try again shortly.</ErrorMessage>
        </FlexStatementResponse>"#;

        let outcome = classifier().classify("42", Ok(RemoteResponse::ok(body)));
        assert!(matches!(outcome, FetchOutcome::NotReady(msg) if msg.starts_with("Error 1019")));
    }

    #[test]
    fn test_unknown_error_code_is_fatal() {
        let body = r#"<FlexStatementResponse>
            <Status>Fail</Status>
            <ErrorCode>1015</ErrorCode>
            <ErrorMessage>Token is invalid.</ErrorMessage>
        </FlexStatementResponse>"#;

        assert_eq!(
            classifier().classify("42", Ok(RemoteResponse::ok(body))),
            FetchOutcome::Fatal("Error 1015: Token is invalid.".to_string())
        );
    }

    #[test]
    fn test_transport_classes() {
        let c = classifier();
        assert!(matches!(
            c.classify("42", Ok(RemoteResponse::with_status(503, "busy"))),
            FetchOutcome::Retryable(_)
        ));
        assert!(matches!(
            c.classify("42", Ok(RemoteResponse::with_status(408, ""))),
            FetchOutcome::Retryable(_)
        ));
        assert!(matches!(
            c.classify("42", Ok(RemoteResponse::with_status(404, "gone"))),
            FetchOutcome::Fatal(_)
        ));
        assert!(matches!(
            c.classify("42", Err(TransportError::Timeout("slow".into()))),
            FetchOutcome::Retryable(_)
        ));
        assert!(matches!(
            c.classify("42", Err(TransportError::Request("bad url".into()))),
            FetchOutcome::Fatal(_)
        ));
    }

    #[test]
    fn test_generated_statement_is_ready() {
        let body = r#"<FlexQueryResponse queryName="trades" type="AF">
            <FlexStatements count="1">
                <FlexStatement accountId="U1234567">
                    <Trades><Trade symbol="AAPL" quantity="10" price="190.5" realizedPL="0"/></Trades>
                </FlexStatement>
            </FlexStatements>
        </FlexQueryResponse>"#;

        match classifier().classify("42", Ok(RemoteResponse::ok(body))) {
            FetchOutcome::Ready(set) => {
                assert_eq!(set.reference.as_deref(), Some("42"));
                assert_eq!(set.total_records, 1);
            }
            other => panic!("expected ready, got {:?}", other),
        }
    }
}
