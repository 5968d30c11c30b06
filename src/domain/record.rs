use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A numeric-like attribute. Values that do not parse keep their raw text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Coerce a raw attribute, keeping the raw string when it is not a finite number
    pub fn numeric(raw: &str) -> Self {
        match raw.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => FieldValue::Number(value),
            _ => FieldValue::Text(raw.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(value) => Some(*value),
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            FieldValue::Number(_) => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, FieldValue::Number(_))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

fn amount(value: &Option<FieldValue>) -> f64 {
    value.as_ref().and_then(FieldValue::as_f64).unwrap_or(0.0)
}

/// Discriminator shared by every record of one response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Trade,
    CashTransaction,
    Position,
    Dividend,
    Generic,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Trade => "trade",
            DataType::CashTransaction => "cash_transaction",
            DataType::Position => "position",
            DataType::Dividend => "dividend",
            DataType::Generic => "generic",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Executed trade
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: Option<String>,
    pub trade_date: Option<String>,
    pub settle_date: Option<String>,
    pub buy_sell: Option<String>,
    pub currency: Option<String>,
    pub asset_category: Option<String>,
    pub trade_id: Option<String>,
    pub quantity: Option<FieldValue>,
    pub price: Option<FieldValue>,
    pub proceeds: Option<FieldValue>,
    pub commission: Option<FieldValue>,
    pub fees: Option<FieldValue>,
    pub realized_pnl: Option<FieldValue>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl TradeRecord {
    /// Realized P&L, zero when absent or unparseable
    pub fn realized_pnl(&self) -> f64 {
        amount(&self.realized_pnl)
    }

    /// Commission cost as a positive amount
    pub fn commission_cost(&self) -> f64 {
        amount(&self.commission).abs()
    }

    /// Fee cost as a positive amount
    pub fn fee_cost(&self) -> f64 {
        amount(&self.fees).abs()
    }

    pub fn traded_at(&self) -> Option<NaiveDateTime> {
        self.trade_date.as_deref().and_then(parse_report_datetime)
    }
}

/// Cash movement (deposits, dividends, interest, fees)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CashTransactionRecord {
    pub transaction_id: Option<String>,
    pub date: Option<String>,
    pub description: Option<String>,
    pub kind: Option<String>,
    pub symbol: Option<String>,
    pub currency: Option<String>,
    pub amount: Option<FieldValue>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

/// Open position snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub symbol: Option<String>,
    pub report_date: Option<String>,
    pub currency: Option<String>,
    pub asset_category: Option<String>,
    pub position: Option<FieldValue>,
    pub mark_price: Option<FieldValue>,
    pub position_value: Option<FieldValue>,
    pub open_price: Option<FieldValue>,
    pub unrealized_pnl: Option<FieldValue>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl PositionRecord {
    pub fn unrealized_pnl(&self) -> f64 {
        amount(&self.unrealized_pnl)
    }
}

/// Dividend accrual change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DividendRecord {
    pub symbol: Option<String>,
    pub ex_date: Option<String>,
    pub pay_date: Option<String>,
    pub currency: Option<String>,
    pub amount: Option<FieldValue>,
    pub quantity: Option<FieldValue>,
    pub gross_rate: Option<FieldValue>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

/// Any attributed element of a document with no known record container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenericRecord {
    pub element: String,
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

/// One parsed unit of a statement document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "data_type", rename_all = "snake_case")]
pub enum Record {
    Trade(TradeRecord),
    CashTransaction(CashTransactionRecord),
    Position(PositionRecord),
    Dividend(DividendRecord),
    Generic(GenericRecord),
}

impl Record {
    pub fn data_type(&self) -> DataType {
        match self {
            Record::Trade(_) => DataType::Trade,
            Record::CashTransaction(_) => DataType::CashTransaction,
            Record::Position(_) => DataType::Position,
            Record::Dividend(_) => DataType::Dividend,
            Record::Generic(_) => DataType::Generic,
        }
    }

    pub fn as_trade(&self) -> Option<&TradeRecord> {
        match self {
            Record::Trade(trade) => Some(trade),
            _ => None,
        }
    }

    pub fn as_position(&self) -> Option<&PositionRecord> {
        match self {
            Record::Position(position) => Some(position),
            _ => None,
        }
    }

    /// Flat key/value view with canonical names; absent fields are omitted
    pub fn fields(&self) -> BTreeMap<String, FieldValue> {
        let Ok(serde_json::Value::Object(map)) = serde_json::to_value(self) else {
            return BTreeMap::new();
        };

        map.into_iter()
            .filter(|(key, _)| key != "data_type")
            .filter_map(|(key, value)| match value {
                serde_json::Value::Number(n) => n.as_f64().map(|v| (key, FieldValue::Number(v))),
                serde_json::Value::String(s) => Some((key, FieldValue::Text(s))),
                _ => None,
            })
            .collect()
    }
}

/// Records parsed from one statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSet {
    /// Reference code the statement was fetched with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub data_type: DataType,
    pub records: Vec<Record>,
    pub total_records: usize,
    pub generated_at: DateTime<Utc>,
}

impl RecordSet {
    pub fn new(data_type: DataType, records: Vec<Record>) -> Self {
        Self {
            reference: None,
            data_type,
            total_records: records.len(),
            records,
            generated_at: Utc::now(),
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn trades(&self) -> impl Iterator<Item = &TradeRecord> {
        self.records.iter().filter_map(Record::as_trade)
    }
}

/// Parse statement dates such as `20240115`, `2024-01-15`, `20240115;093000`
/// or `2024-01-15, 09:30:00`.
pub fn parse_report_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    let (date_part, time_part) = match raw.find([';', ',', ' ', 'T']) {
        Some(idx) => (&raw[..idx], raw[idx + 1..].trim()),
        None => (raw, ""),
    };

    let date = NaiveDate::parse_from_str(date_part, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(date_part, "%Y-%m-%d"))
        .ok()?;

    let time = NaiveTime::parse_from_str(time_part, "%H%M%S")
        .or_else(|_| NaiveTime::parse_from_str(time_part, "%H:%M:%S"))
        .unwrap_or(NaiveTime::MIN);

    Some(date.and_time(time))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_coercion_keeps_raw_text() {
        assert_eq!(FieldValue::numeric("12.5"), FieldValue::Number(12.5));
        assert_eq!(FieldValue::numeric(" -3 "), FieldValue::Number(-3.0));
        assert_eq!(FieldValue::numeric("--"), FieldValue::Text("--".to_string()));
        assert_eq!(FieldValue::numeric(""), FieldValue::Text(String::new()));
        assert_eq!(FieldValue::numeric("NaN"), FieldValue::Text("NaN".to_string()));
    }

    #[test]
    fn test_parse_report_datetime_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        assert_eq!(parse_report_datetime("20240115;093000"), Some(expected));
        assert_eq!(parse_report_datetime("2024-01-15, 09:30:00"), Some(expected));
        assert_eq!(
            parse_report_datetime("20240115"),
            NaiveDate::from_ymd_opt(2024, 1, 15).map(|d| d.and_time(NaiveTime::MIN))
        );
        assert_eq!(parse_report_datetime("soon"), None);
    }

    #[test]
    fn test_record_fields_view() {
        let record = Record::Trade(TradeRecord {
            symbol: Some("AAPL".to_string()),
            quantity: Some(FieldValue::Number(10.0)),
            price: Some(FieldValue::Text("n/a".to_string())),
            extra: BTreeMap::from([("exchange".to_string(), "NASDAQ".to_string())]),
            ..Default::default()
        });

        let fields = record.fields();
        assert_eq!(record.data_type(), DataType::Trade);
        assert_eq!(fields.get("symbol"), Some(&FieldValue::Text("AAPL".to_string())));
        assert_eq!(fields.get("quantity"), Some(&FieldValue::Number(10.0)));
        assert_eq!(fields.get("price"), Some(&FieldValue::Text("n/a".to_string())));
        assert_eq!(fields.get("exchange"), Some(&FieldValue::Text("NASDAQ".to_string())));
        assert!(!fields.contains_key("data_type"));
        assert!(!fields.contains_key("realized_pnl"));
    }

    #[test]
    fn test_record_json_carries_data_type() {
        let record = Record::Position(PositionRecord {
            symbol: Some("MSFT".to_string()),
            unrealized_pnl: Some(FieldValue::Number(-12.5)),
            ..Default::default()
        });
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["data_type"], "position");

        let back: Record = serde_json::from_value(json).unwrap();
        assert_eq!(back.as_position().map(|p| p.unrealized_pnl()), Some(-12.5));
    }
}
