mod bundle;
mod config;
mod errors;
mod export;
mod geocoder;
mod normalize;
mod pipeline;
mod sheets;
mod store;

use once_cell::sync::OnceCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use bundle::merge_js_files;
pub use config::{AppConfig, PublicAppConfig, DEFAULT_GEOCODER_ENDPOINT};
pub use errors::{AppError, AppResult};
pub use export::{export_snapshot, write_snapshot, Filters, HotelMarker, Snapshot, SnapshotFiles};
pub use geocoder::{BaiduGeocoder, Coordinates, GeocodeLookup, Geocoder, RetryPolicy};
pub use normalize::{CarryForward, NormalizedRow, RowNormalizer, SheetLayout};
pub use pipeline::{ImportPipeline, ImportReport, SheetPlan, SheetReport};
pub use sheets::{read_workbook, RawCell, Sheet};
pub use store::{count_hotels, insert_hotel, load_hotels, open_store, HotelRecord};

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,hotel_geo_import=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}
