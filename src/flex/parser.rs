//! Statement document parser.
//!
//! A document is classified by the first known record element it contains,
//! in priority order `Trade`, `CashTransaction`, `OpenPosition`,
//! `ChangeInDividendAccrual`. Documents with none of these yield generic
//! records, one per attributed element outside the statement envelope.

use roxmltree::{Document, Node};
use std::collections::BTreeMap;

use crate::domain::{
    CashTransactionRecord, DataType, DividendRecord, FieldValue, GenericRecord, PositionRecord,
    Record, RecordSet, TradeRecord,
};
use crate::error::Result;

const ENVELOPE_TAGS: [&str; 3] = ["FlexQueryResponse", "FlexStatements", "FlexStatement"];

/// Prefix for leftover attributes whose snake_case name is already taken
const SHADOWED_PREFIX: &str = "attr_";

const TRADE_FIELDS: &[&str] = &[
    "symbol",
    "trade_date",
    "settle_date",
    "buy_sell",
    "currency",
    "asset_category",
    "trade_id",
    "quantity",
    "price",
    "proceeds",
    "commission",
    "fees",
    "realized_pnl",
];
const CASH_FIELDS: &[&str] = &[
    "transaction_id",
    "date",
    "description",
    "kind",
    "symbol",
    "currency",
    "amount",
];
const POSITION_FIELDS: &[&str] = &[
    "symbol",
    "report_date",
    "currency",
    "asset_category",
    "position",
    "mark_price",
    "position_value",
    "open_price",
    "unrealized_pnl",
];
const DIVIDEND_FIELDS: &[&str] = &[
    "symbol",
    "ex_date",
    "pay_date",
    "currency",
    "amount",
    "quantity",
    "gross_rate",
];
const GENERIC_FIELDS: &[&str] = &["element"];

/// Parse a statement document into a homogeneous record set.
///
/// Only malformed XML is an error; a well-formed document without any
/// recognised content yields an empty generic set.
pub fn parse(document: &str) -> Result<RecordSet> {
    let doc = Document::parse(document)?;
    Ok(parse_document(&doc))
}

pub(crate) fn parse_document(doc: &Document<'_>) -> RecordSet {
    let root = doc.root_element();

    if has_element(root, "Trade") {
        return collect(root, "Trade", DataType::Trade, |a| Record::Trade(trade(a)));
    }
    if has_element(root, "CashTransaction") {
        return collect(root, "CashTransaction", DataType::CashTransaction, |a| {
            Record::CashTransaction(cash_transaction(a))
        });
    }
    if has_element(root, "OpenPosition") {
        return collect(root, "OpenPosition", DataType::Position, |a| {
            Record::Position(position(a))
        });
    }
    if has_element(root, "ChangeInDividendAccrual") {
        return collect(root, "ChangeInDividendAccrual", DataType::Dividend, |a| {
            Record::Dividend(dividend(a))
        });
    }

    let records = root
        .descendants()
        .filter(|n| n.is_element() && n.attributes().next().is_some())
        .filter(|n| !ENVELOPE_TAGS.contains(&n.tag_name().name()))
        .map(|n| {
            Record::Generic(GenericRecord {
                element: n.tag_name().name().to_string(),
                fields: Attributes::of(n).into_extra(GENERIC_FIELDS),
            })
        })
        .collect();

    RecordSet::new(DataType::Generic, records)
}

fn elements<'a, 'input: 'a>(
    root: Node<'a, 'input>,
    tag: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    root.descendants()
        .filter(move |n| n.is_element() && n.tag_name().name() == tag)
}

fn has_element(root: Node<'_, '_>, tag: &str) -> bool {
    elements(root, tag).next().is_some()
}

fn collect(
    root: Node<'_, '_>,
    tag: &str,
    data_type: DataType,
    build: impl Fn(Attributes) -> Record,
) -> RecordSet {
    let records = elements(root, tag).map(|n| build(Attributes::of(n))).collect();
    RecordSet::new(data_type, records)
}

/// Attribute bag that hands out canonical fields and keeps the rest
struct Attributes(BTreeMap<String, String>);

impl Attributes {
    fn of(node: Node<'_, '_>) -> Self {
        Self(
            node.attributes()
                .map(|a| (a.name().to_string(), a.value().to_string()))
                .collect(),
        )
    }

    /// Remove every alias in `keys`; the first non-blank value wins
    fn text(&mut self, keys: &[&str]) -> Option<String> {
        let values: Vec<String> = keys.iter().filter_map(|k| self.0.remove(*k)).collect();
        values
            .iter()
            .find(|v| !v.trim().is_empty())
            .or_else(|| values.first())
            .cloned()
    }

    fn number(&mut self, keys: &[&str]) -> Option<FieldValue> {
        self.text(keys).map(|raw| FieldValue::numeric(&raw))
    }

    /// Remaining attributes keyed in snake_case. Names that would clash with
    /// `fields` or the `data_type` tag once flattened get [`SHADOWED_PREFIX`].
    fn into_extra(self, fields: &[&str]) -> BTreeMap<String, String> {
        let mut extra = BTreeMap::new();
        for (key, value) in self.0 {
            let mut key = snake_case(&key);
            if key == "data_type" || fields.contains(&key.as_str()) {
                key.insert_str(0, SHADOWED_PREFIX);
            }
            extra.entry(key).or_insert(value);
        }
        extra
    }
}

fn trade(mut a: Attributes) -> TradeRecord {
    TradeRecord {
        symbol: a.text(&["symbol"]),
        trade_date: a.text(&["tradeDate", "dateTime"]),
        settle_date: a.text(&["settleDateTarget", "settleDate"]),
        buy_sell: a.text(&["buySell"]),
        currency: a.text(&["currency"]),
        asset_category: a.text(&["assetCategory"]),
        trade_id: a.text(&["tradeID", "tradeId", "transactionID"]),
        quantity: a.number(&["quantity"]),
        price: a.number(&["price", "tradePrice"]),
        proceeds: a.number(&["proceeds"]),
        commission: a.number(&["commission", "ibCommission"]),
        fees: a.number(&["fees"]),
        realized_pnl: a.number(&["realizedPL", "fifoPnlRealized"]),
        extra: a.into_extra(TRADE_FIELDS),
    }
}

fn cash_transaction(mut a: Attributes) -> CashTransactionRecord {
    CashTransactionRecord {
        transaction_id: a.text(&["transactionID", "transactionId"]),
        date: a.text(&["dateTime", "date"]),
        description: a.text(&["description"]),
        kind: a.text(&["type"]),
        symbol: a.text(&["symbol"]),
        currency: a.text(&["currency"]),
        amount: a.number(&["amount"]),
        extra: a.into_extra(CASH_FIELDS),
    }
}

fn position(mut a: Attributes) -> PositionRecord {
    PositionRecord {
        symbol: a.text(&["symbol"]),
        report_date: a.text(&["reportDate"]),
        currency: a.text(&["currency"]),
        asset_category: a.text(&["assetCategory"]),
        position: a.number(&["position"]),
        mark_price: a.number(&["markPrice"]),
        position_value: a.number(&["positionValue"]),
        open_price: a.number(&["openPrice", "costBasisPrice"]),
        unrealized_pnl: a.number(&["unrealizedPL", "fifoPnlUnrealized"]),
        extra: a.into_extra(POSITION_FIELDS),
    }
}

fn dividend(mut a: Attributes) -> DividendRecord {
    DividendRecord {
        symbol: a.text(&["symbol"]),
        ex_date: a.text(&["exDate", "date"]),
        pay_date: a.text(&["payDate"]),
        currency: a.text(&["currency"]),
        amount: a.number(&["totalCash", "amount"]),
        quantity: a.number(&["quantity"]),
        gross_rate: a.number(&["grossRate"]),
        extra: a.into_extra(DIVIDEND_FIELDS),
    }
}

/// `fxRateToBase` -> `fx_rate_to_base`, `ibOrderID` -> `ib_order_id`
fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            if prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_lower)
            {
                out.push('_');
            }
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}
