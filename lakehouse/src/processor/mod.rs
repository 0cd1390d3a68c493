pub mod ledger;
pub mod load;
pub mod pool;
pub mod reporting;
pub mod table;
pub mod views;

pub use ledger::{LedgerEntry, LoadLedger, content_hash};
pub use load::{Dataset, LoadSummary, Loader, climate_batch, weather_batch};
pub use pool::ConnectionPool;
pub use reporting::rebuild_reporting;
pub use table::TableStore;
pub use views::{Grain, latest_weather, publish_views, reporting_for};
