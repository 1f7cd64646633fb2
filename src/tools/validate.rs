//! 工具结果校验
//!
//! 提供方返回的原始 JSON 结构松散：这里把它们转成带类型的 FlightOffer / WeatherSnapshot，
//! 单个条目的错误只记录到 errors，不丢弃整批结果。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 航班报价（只保留下游依赖的字段）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightOffer {
    pub price: f64,
    pub currency: String,
    pub departure_airport: String,
    pub arrival_airport: String,
    pub departure_time: String,
    pub airline: String,
}

/// 天气快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub date: String,
    pub city: String,
    pub summary: String,
}

/// validate_flights 的输出：成功条目 + 逐条错误
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlightValidation {
    pub offers: Vec<FlightOffer>,
    pub errors: Vec<String>,
}

/// 属于结构性问题（而非提供方报错）的错误前缀
pub const STRUCTURAL_ERRORS: [&str; 3] = ["not_list", "non_dict_item", "bad_item:"];

pub fn is_structural_error(err: &str) -> bool {
    STRUCTURAL_ERRORS.iter().any(|p| err.starts_with(p))
}

pub fn validate_flights(raw: &Value) -> FlightValidation {
    let mut out = FlightValidation::default();
    let Some(items) = raw.as_array() else {
        out.errors.push("not_list".to_string());
        return out;
    };

    for item in items {
        let Some(obj) = item.as_object() else {
            out.errors.push("non_dict_item".to_string());
            continue;
        };
        if let Some(err) = obj.get("error") {
            out.errors.push(provider_error_text(err));
            continue;
        }
        match coerce_offer(obj) {
            Ok(offer) => out.offers.push(offer),
            Err(detail) => out.errors.push(format!("bad_item:{detail}")),
        }
    }
    out
}

fn provider_error_text(err: &Value) -> String {
    match err {
        Value::String(s) if !s.trim().is_empty() => s.clone(),
        Value::Null | Value::String(_) | Value::Bool(false) => "flight_error".to_string(),
        other => other.to_string(),
    }
}

fn coerce_offer(obj: &Map<String, Value>) -> Result<FlightOffer, String> {
    let price = match obj.get("price") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
        None => return Err("missing field 'price'".to_string()),
    }
    .filter(|p| p.is_finite())
    .ok_or_else(|| "price is not numeric".to_string())?;

    Ok(FlightOffer {
        price,
        currency: optional_text(obj, "currency").unwrap_or_else(|| "USD".to_string()),
        departure_airport: required_text(obj, "departure_airport")?,
        arrival_airport: required_text(obj, "arrival_airport")?,
        departure_time: required_text(obj, "departure_time")?,
        airline: optional_text(obj, "airline").unwrap_or_default(),
    })
}

fn optional_text(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn required_text(obj: &Map<String, Value>, key: &str) -> Result<String, String> {
    if !obj.contains_key(key) {
        return Err(format!("missing field '{key}'"));
    }
    optional_text(obj, key).ok_or_else(|| format!("field '{key}' is not text"))
}

/// 最低价；空列表返回 None
pub fn extract_min_price(offers: &[FlightOffer]) -> Option<f64> {
    cheapest_offer(offers).map(|o| o.price)
}

pub fn cheapest_offer(offers: &[FlightOffer]) -> Option<&FlightOffer> {
    offers
        .iter()
        .filter(|o| o.price.is_finite())
        .min_by(|a, b| a.price.total_cmp(&b.price))
}

/// 天气工具必须返回文本；否则报告 not_string
pub fn validate_weather(
    raw: &Value,
    date: Option<&str>,
    city: Option<&str>,
) -> Result<WeatherSnapshot, String> {
    let Some(text) = raw.as_str() else {
        return Err("not_string".to_string());
    };
    Ok(WeatherSnapshot {
        date: date.unwrap_or_default().to_string(),
        city: city.unwrap_or_default().to_string(),
        summary: text.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn offer(price: f64) -> FlightOffer {
        FlightOffer {
            price,
            currency: "USD".into(),
            departure_airport: "DEL".into(),
            arrival_airport: "GOI".into(),
            departure_time: "2025-12-10T06:00".into(),
            airline: "AI".into(),
        }
    }

    #[test]
    fn test_min_price() {
        assert_eq!(extract_min_price(&[]), None);
        let offers = vec![offer(820.0), offer(430.0), offer(999.0)];
        assert_eq!(extract_min_price(&offers), Some(430.0));
    }

    #[test]
    fn test_error_item_is_collected() {
        let out = validate_flights(&json!([{"error": "no route"}]));
        assert!(out.offers.is_empty());
        assert_eq!(out.errors, vec!["no route".to_string()]);
    }

    #[test]
    fn test_non_list_rejected() {
        let out = validate_flights(&json!("no flights today"));
        assert!(out.offers.is_empty());
        assert_eq!(out.errors, vec!["not_list".to_string()]);
    }

    #[test]
    fn test_bad_item_does_not_abort_batch() {
        let raw = json!([
            {
                "price": "not-a-number",
                "departure_airport": "DEL",
                "arrival_airport": "GOI",
                "departure_time": "t"
            },
            42,
            {
                "price": "310.5",
                "departure_airport": "DEL",
                "arrival_airport": "GOI",
                "departure_time": "t"
            }
        ]);
        let out = validate_flights(&raw);
        assert_eq!(out.offers.len(), 1);
        assert_eq!(out.offers[0].price, 310.5);
        assert_eq!(out.offers[0].currency, "USD");
        assert_eq!(out.errors.len(), 2);
        assert!(out.errors[0].starts_with("bad_item:"));
        assert_eq!(out.errors[1], "non_dict_item");
        assert!(out.errors.iter().all(|e| is_structural_error(e)));
    }

    #[test]
    fn test_missing_airport_is_bad_item() {
        let out = validate_flights(&json!([{"price": 100}]));
        assert_eq!(out.errors, vec!["bad_item:missing field 'departure_airport'".to_string()]);
    }

    #[test]
    fn test_weather_requires_text() {
        let snap =
            validate_weather(&json!("  Sunny, 31°C "), Some("2025-12-10"), Some("Goa")).unwrap();
        assert_eq!(snap.summary, "Sunny, 31°C");
        assert_eq!(snap.date, "2025-12-10");
        assert_eq!(
            validate_weather(&json!({"temp": 31}), None, None),
            Err("not_string".to_string())
        );
    }
}
