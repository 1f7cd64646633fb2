//! 离线数据提供方
//!
//! 不访问网络、输出确定的工具实现，供二进制默认注册与测试使用。
//! 返回形状与真实提供方一致：航班为报价列表，其余为文本。

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{
    Tool, ToolRegistry, ACTIVITIES, BUDGET_ESTIMATOR, FLIGHT_SEARCH, ITINERARY_ASSEMBLER,
    NEARBY_PLACES, WEATHER,
};

const AIRLINES: [&str; 3] = ["IndiGo", "Air India", "Vistara"];
const WEATHER_KINDS: [&str; 4] = ["Sunny", "Partly cloudy", "Light showers", "Clear skies"];

fn text_arg<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("invalid argument: '{key}' is required"))
}

fn seed(parts: &[&str]) -> u64 {
    parts
        .iter()
        .flat_map(|p| p.to_lowercase().into_bytes())
        .fold(17u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64))
}

/// 城市名前三个字母作机场代码
fn airport_code(city: &str) -> String {
    city.chars()
        .filter(|c| c.is_alphabetic())
        .take(3)
        .collect::<String>()
        .to_uppercase()
}

pub struct MockFlightSearch;

#[async_trait]
impl Tool for MockFlightSearch {
    fn name(&self) -> &str {
        FLIGHT_SEARCH
    }

    fn description(&self) -> &str {
        "Offline flight offers for origin/destination/date/travelers"
    }

    async fn call(&self, args: Value) -> Result<Value, String> {
        let origin = text_arg(&args, "origin")?;
        let destination = text_arg(&args, "destination")?;
        let date = text_arg(&args, "date")?;
        if origin.eq_ignore_ascii_case(destination) {
            return Ok(json!([{ "error": "no route: origin equals destination" }]));
        }
        let travelers = args.get("travelers").and_then(Value::as_u64).unwrap_or(1).max(1);
        let base = 80 + seed(&[origin, destination]) % 220;
        let offers: Vec<Value> = AIRLINES
            .iter()
            .enumerate()
            .map(|(i, airline)| {
                let per_head = base + (i as u64) * 35;
                json!({
                    "price": per_head * travelers,
                    "currency": "USD",
                    "departure_airport": airport_code(origin),
                    "arrival_airport": airport_code(destination),
                    "departure_time": format!("{date}T{:02}:15", 6 + i * 4),
                    "airline": airline,
                })
            })
            .collect();
        Ok(Value::Array(offers))
    }
}

pub struct MockWeather;

#[async_trait]
impl Tool for MockWeather {
    fn name(&self) -> &str {
        WEATHER
    }

    fn description(&self) -> &str {
        "Offline weather summary for a city and date"
    }

    async fn call(&self, args: Value) -> Result<Value, String> {
        let city = text_arg(&args, "city")?;
        let date = text_arg(&args, "date")?;
        let s = seed(&[city, date]);
        let kind = WEATHER_KINDS[(s % WEATHER_KINDS.len() as u64) as usize];
        let temp = 18 + s % 15;
        Ok(json!(format!("{kind} in {city} on {date}, around {temp}°C")))
    }
}

pub struct MockActivities;

#[async_trait]
impl Tool for MockActivities {
    fn name(&self) -> &str {
        ACTIVITIES
    }

    fn description(&self) -> &str {
        "Offline activity suggestions for a destination"
    }

    async fn call(&self, args: Value) -> Result<Value, String> {
        let city = text_arg(&args, "city")?;
        let mut lines = vec![
            format!("1. Walking tour of old {city}"),
            format!("2. Local food market in {city}"),
            "3. Sunset viewpoint".to_string(),
            "4. Museum afternoon".to_string(),
        ];
        if let Some(interests) = args.get("interests").and_then(Value::as_array) {
            for interest in interests.iter().filter_map(Value::as_str) {
                let n = lines.len() + 1;
                lines.push(format!("{n}. {interest} experience"));
            }
        }
        Ok(json!(lines.join("\n")))
    }
}

pub struct MockNearby;

#[async_trait]
impl Tool for MockNearby {
    fn name(&self) -> &str {
        NEARBY_PLACES
    }

    fn description(&self) -> &str {
        "Offline nearby points of interest for a destination"
    }

    async fn call(&self, args: Value) -> Result<Value, String> {
        let city = text_arg(&args, "city")?;
        Ok(json!(format!(
            "Near {city}: central market (1.2 km), heritage quarter (2.5 km), \
             riverside park (3.8 km)"
        )))
    }
}

pub struct MockBudget;

#[async_trait]
impl Tool for MockBudget {
    fn name(&self) -> &str {
        BUDGET_ESTIMATOR
    }

    fn description(&self) -> &str {
        "Offline budget estimate from destination, nights, travelers and flight cost"
    }

    async fn call(&self, args: Value) -> Result<Value, String> {
        let destination = text_arg(&args, "destination")?;
        let nights = args.get("nights").and_then(Value::as_u64).unwrap_or(1).max(1);
        let travelers = args.get("travelers").and_then(Value::as_u64).unwrap_or(1).max(1);
        let activity_count = args
            .get("activities")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0) as u64;

        let lodging = 60 * nights * travelers.div_ceil(2);
        let food = 25 * (nights + 1) * travelers;
        let activities = 20 * activity_count.max(2) * travelers;
        let mut total = (lodging + food + activities) as f64;
        let mut lines = vec![
            format!("Budget for {destination} ({nights} nights, {travelers} travelers):"),
            format!("- Lodging: USD {lodging}"),
            format!("- Food: USD {food}"),
            format!("- Activities: USD {activities}"),
        ];
        match args.get("flight_cost").and_then(Value::as_f64) {
            Some(cost) => {
                let currency = args
                    .get("flight_currency")
                    .and_then(Value::as_str)
                    .unwrap_or("USD");
                lines.push(format!("- Flights: {currency} {cost:.0}"));
                total += cost;
            }
            None => lines.push("- Flights: not included".to_string()),
        }
        lines.push(format!("Estimated total: USD {total:.0}"));
        Ok(json!(lines.join("\n")))
    }
}

pub struct MockAssembler;

#[async_trait]
impl Tool for MockAssembler {
    fn name(&self) -> &str {
        ITINERARY_ASSEMBLER
    }

    fn description(&self) -> &str {
        "Offline itinerary text from the trip summary and collected results"
    }

    async fn call(&self, args: Value) -> Result<Value, String> {
        let trip = args.get("trip").cloned().unwrap_or(Value::Null);
        let destination = trip
            .get("destination")
            .and_then(Value::as_str)
            .unwrap_or("your destination");
        let days = trip.get("duration_days").and_then(Value::as_u64).unwrap_or(1).max(1);

        let mut out = vec![format!("Itinerary for {destination}")];
        for day in 1..=days {
            out.push(format!("Day {day}: explore {destination}"));
        }
        if let Some(results) = args.get("results").and_then(Value::as_object) {
            for (key, value) in results {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                out.push(format!("[{key}] {text}"));
            }
        }
        Ok(json!(out.join("\n")))
    }
}

/// 注册全部离线工具
pub fn register_mock_tools(registry: &mut ToolRegistry) {
    registry.register(MockFlightSearch);
    registry.register(MockWeather);
    registry.register(MockActivities);
    registry.register(MockNearby);
    registry.register(MockBudget);
    registry.register(MockAssembler);
}
