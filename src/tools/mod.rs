pub mod cache;
pub mod executor;
pub mod mock;
pub mod registry;
pub mod validate;

pub use cache::ToolCache;
pub use executor::{BatchCall, ToolExecutor, ToolMeta, ToolResult};
pub use mock::register_mock_tools;
pub use registry::{Tool, ToolRegistry};
pub use validate::{
    cheapest_offer, extract_min_price, is_structural_error, validate_flights, validate_weather,
    FlightOffer, FlightValidation, WeatherSnapshot,
};

/// 各计划步骤对应的工具注册名
pub const FLIGHT_SEARCH: &str = "flight_search";
pub const WEATHER: &str = "weather";
pub const ACTIVITIES: &str = "activities";
pub const NEARBY_PLACES: &str = "nearby_places";
pub const BUDGET_ESTIMATOR: &str = "budget_estimator";
pub const ITINERARY_ASSEMBLER: &str = "itinerary_assembler";
