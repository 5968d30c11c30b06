pub mod api_server;
pub mod flex_web;
pub mod paper_broker;

pub use api_server::start_api_server;
pub use flex_web::FlexWebClient;
pub use paper_broker::PaperBroker;
