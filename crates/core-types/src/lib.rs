pub mod enums;
pub mod error;
pub mod structs;
pub mod timestamp;

// Re-export the core types to provide a clean public API.
pub use enums::{TradeSide, View};
pub use error::CoreError;
pub use structs::{
    Account, Holding, MessageKind, PriceQuote, SettledTrade, TradeMessage, TradeOutcome,
    TradeRequest, Transaction,
};
