//! Market-Data Manager (C6): turns subscription requests into `35=V`
//! messages and normalizes `35=W` (snapshot) / `35=X` (incremental) updates
//! into a per-symbol book keyed by (session, symbol).

use std::collections::HashMap;

use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::message::Envelope;
use crate::session::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Bid,
    Offer,
    Trade,
}

impl EntryType {
    fn fix_code(self) -> &'static str {
        match self {
            EntryType::Bid => "0",
            EntryType::Offer => "1",
            EntryType::Trade => "2",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "0" => Some(EntryType::Bid),
            "1" => Some(EntryType::Offer),
            "2" => Some(EntryType::Trade),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryAction {
    New,
    Change,
    Delete,
}

impl EntryAction {
    fn from_code(code: &str) -> Option<Self> {
        match code {
            "0" => Some(EntryAction::New),
            "1" => Some(EntryAction::Change),
            "2" => Some(EntryAction::Delete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NormalizedBook {
    pub bid_price: Option<Decimal>,
    pub bid_size: Option<Decimal>,
    pub ask_price: Option<Decimal>,
    pub ask_size: Option<Decimal>,
    pub last_price: Option<Decimal>,
    pub last_size: Option<Decimal>,
    pub last_update_micros: i64,
    entries: HashMap<String, BookEntry>,
}

#[derive(Debug, Clone)]
struct BookEntry {
    entry_type: EntryType,
    price: Option<Decimal>,
    size: Option<Decimal>,
}

impl NormalizedBook {
    fn apply(&mut self, entry_id: String, action: EntryAction, entry_type: EntryType, price: Option<Decimal>, size: Option<Decimal>) {
        match action {
            EntryAction::Delete => {
                self.entries.remove(&entry_id);
            }
            EntryAction::New | EntryAction::Change => {
                self.entries.insert(entry_id, BookEntry { entry_type, price, size });
            }
        }
        self.recompute_top_of_book();
    }

    fn recompute_top_of_book(&mut self) {
        self.bid_price = None;
        self.bid_size = None;
        self.ask_price = None;
        self.ask_size = None;

        for entry in self.entries.values() {
            match entry.entry_type {
                EntryType::Bid => {
                    if entry.price > self.bid_price || self.bid_price.is_none() {
                        self.bid_price = entry.price;
                        self.bid_size = entry.size;
                    }
                }
                EntryType::Offer => {
                    let better = match (entry.price, self.ask_price) {
                        (Some(p), Some(best)) => p < best,
                        (Some(_), None) => true,
                        _ => false,
                    };
                    if better {
                        self.ask_price = entry.price;
                        self.ask_size = entry.size;
                    }
                }
                EntryType::Trade => {
                    self.last_price = entry.price;
                    self.last_size = entry.size;
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SubscriptionKey {
    session: SessionId,
    symbol: String,
}

pub struct MarketDataManager {
    subscriptions: Mutex<HashMap<SubscriptionKey, String>>, // -> request-id
    books: Mutex<HashMap<SubscriptionKey, NormalizedBook>>,
    next_request_id: std::sync::atomic::AtomicU64,
}

impl MarketDataManager {
    pub fn new() -> Self {
        Self {
            subscriptions: Mutex::new(HashMap::new()),
            books: Mutex::new(HashMap::new()),
            next_request_id: std::sync::atomic::AtomicU64::new(1),
        }
    }

    /// Build the `35=V` field list for a snapshot+updates subscription.
    /// `market_depth` of 0 requests a full (not top-of-book) book.
    pub fn subscribe(
        &self,
        session: &SessionId,
        symbol: &str,
        market_depth: u32,
        entry_types: &[EntryType],
    ) -> Vec<(u16, String)> {
        let request_id = format!("MD{}", self.next_request_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed));
        self.subscriptions.lock().insert(
            SubscriptionKey { session: session.clone(), symbol: symbol.to_string() },
            request_id.clone(),
        );
        self.books
            .lock()
            .entry(SubscriptionKey { session: session.clone(), symbol: symbol.to_string() })
            .or_default();

        let mut fields = vec![
            (262u16, request_id),
            (263, "1".to_string()), // SubscriptionRequestType: snapshot + updates
            (264, market_depth.to_string()),
            (146, "1".to_string()), // NoRelatedSym
            (55, symbol.to_string()),
            (267, entry_types.len().to_string()), // NoMDEntryTypes
        ];
        for entry_type in entry_types {
            fields.push((269, entry_type.fix_code().to_string()));
        }
        fields
    }

    pub fn unsubscribe(&self, session: &SessionId, symbol: &str) -> Option<Vec<(u16, String)>> {
        let key = SubscriptionKey { session: session.clone(), symbol: symbol.to_string() };
        let request_id = self.subscriptions.lock().remove(&key)?;
        self.books.lock().remove(&key);
        Some(vec![
            (262u16, request_id),
            (263, "2".to_string()), // SubscriptionRequestType: disable previous snapshot+updates
        ])
    }

    /// Apply a `35=W` (full refresh) or `35=X` (incremental refresh)
    /// message, returning the resulting normalized book.
    pub fn apply_update(&self, session: &SessionId, env: &Envelope) -> Option<NormalizedBook> {
        let symbol = env.field(55)?.to_string();
        let key = SubscriptionKey { session: session.clone(), symbol };
        let mut books = self.books.lock();
        let book = books.entry(key).or_default();

        let is_snapshot = matches!(env.msg_type, crate::core::types::MsgType::MarketDataSnapshotFullRefresh);
        if is_snapshot {
            *book = NormalizedBook::default();
        }

        // Walk the repeating group in wire order: each entry starts at a
        // tag-269 (MDEntryType) field; subsequent 270/271/278 tags (price,
        // size, entry id) before the next 269 belong to the same entry.
        let buf = env.buffer.as_deref().unwrap_or(&[]);
        let mut current_type: Option<EntryType> = None;
        let mut current_action = EntryAction::New;
        let mut current_price: Option<Decimal> = None;
        let mut current_size: Option<Decimal> = None;
        let mut current_id: Option<String> = None;

        let flush = |book: &mut NormalizedBook,
                     entry_type: &mut Option<EntryType>,
                     action: &mut EntryAction,
                     price: &mut Option<Decimal>,
                     size: &mut Option<Decimal>,
                     id: &mut Option<String>| {
            // Only the entry that was actually flushed owns `action`: if
            // nothing was open yet (e.g. 279 arrived before the first 269
            // in wire order), leave it alone so the next entry still sees
            // it.
            if let Some(entry_type) = entry_type.take() {
                let entry_id = id.take().unwrap_or_default();
                book.apply(entry_id, *action, entry_type, price.take(), size.take());
                *action = EntryAction::New;
            }
        };

        for (tag, value) in env.fields.iter(buf) {
            match tag {
                269 => {
                    flush(book, &mut current_type, &mut current_action, &mut current_price, &mut current_size, &mut current_id);
                    current_type = EntryType::from_code(value);
                }
                270 => current_price = value.parse().ok(),
                271 => current_size = value.parse().ok(),
                278 => current_id = Some(value.to_string()),
                279 => current_action = EntryAction::from_code(value).unwrap_or(EntryAction::New),
                _ => {}
            }
        }
        flush(book, &mut current_type, &mut current_action, &mut current_price, &mut current_size, &mut current_id);

        if let Some(sending_time) = env.field(52) {
            book.last_update_micros = crate::core::clock::parse_fix_timestamp(sending_time).unwrap_or(0);
        }

        Some(book.clone())
    }

    pub fn book(&self, session: &SessionId, symbol: &str) -> Option<NormalizedBook> {
        let key = SubscriptionKey { session: session.clone(), symbol: symbol.to_string() };
        self.books.lock().get(&key).cloned()
    }
}

impl Default for MarketDataManager {
    fn default() -> Self {
        Self::new()
    }
}
