//! 行程上下文
//!
//! TripContext 独占持有所有行程参数与派生字段，所有写入都经过访问方法：
//! - 用户槽位走 set / correct，保证「每个槽位只提交一次，除非用户显式更正」；
//! - 日期只有 ISO 形式输入或用户确认提议日期才会变成 committed；
//! - flight_cost / weather_snapshot 只由计划执行器写回，外部不可直接修改。

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::slots::{Provenance, SlotName, SlotSource, SlotStatus, SlotTracker, SlotValue};
use crate::tools::WeatherSnapshot;

/// 非 ISO 但可识别的日期写法，只能形成「提议日期」
const LOOSE_DATE_FORMATS: [&str; 10] = [
    "%d %B %Y",
    "%d %b %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d/%m/%Y",
    "%Y/%m/%d",
    "%d.%m.%Y",
    "%d-%m-%Y",
];

const MAX_TRIP_DAYS: u32 = 365;
const MAX_TRAVELERS: u32 = 100;

/// set / correct 的结果
#[derive(Debug, Clone, PartialEq)]
pub enum SetOutcome {
    Committed,
    /// 日期可识别但非 ISO：记为提议，等待用户确认
    Proposed(NaiveDate),
    /// 槽位已提交，忽略本次写入
    Ignored,
    Rejected(String),
}

/// 计划步骤的前置条件键（只看是否存在，不校验值）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKey {
    OriginCity,
    Destination,
    CommittedStartDate,
    DurationDays,
}

impl ContextKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OriginCity => "origin_city",
            Self::Destination => "destination",
            Self::CommittedStartDate => "committed_start_date",
            Self::DurationDays => "duration_days",
        }
    }
}

/// 下一个需要追问的槽位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingSlot {
    pub slot: SlotName,
    /// 日期槽位存在未确认的提议日期时，应请用户确认而不是重新提问
    pub proposal: Option<NaiveDate>,
}

/// 计划签名：这些参数任一变化都会导致整份计划重建
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripSignature {
    pub origin_city: Option<String>,
    pub destination: Option<String>,
    pub committed_start_date: Option<NaiveDate>,
    pub duration_days: Option<u32>,
    pub traveler_count: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TripContext {
    origin_city: Option<String>,
    destination: Option<String>,
    /// 用户给出的原始 ISO 日期文本
    start_date: Option<String>,
    proposed_start_date: Option<NaiveDate>,
    committed_start_date: Option<NaiveDate>,
    duration_days: Option<u32>,
    traveler_count: Option<u32>,
    currency: Option<String>,
    budget: Option<String>,
    interests: Vec<String>,
    flight_cost: Option<f64>,
    flight_currency: Option<String>,
    weather_snapshot: Option<WeatherSnapshot>,
    slots: SlotTracker,
}

impl TripContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, slot: SlotName) -> Option<SlotValue> {
        match slot {
            SlotName::OriginCity => self.origin_city.clone().map(SlotValue::Text),
            SlotName::Destination => self.destination.clone().map(SlotValue::Text),
            SlotName::StartDate => self
                .committed_start_date
                .map(|d| SlotValue::Text(d.to_string()))
                .or_else(|| self.start_date.clone().map(SlotValue::Text)),
            SlotName::DurationDays => self.duration_days.map(SlotValue::Count),
            SlotName::TravelerCount => self.traveler_count.map(SlotValue::Count),
            SlotName::Currency => self.currency.clone().map(SlotValue::Text),
            SlotName::Budget => self.budget.clone().map(SlotValue::Text),
            SlotName::Interests => {
                (!self.interests.is_empty()).then(|| SlotValue::List(self.interests.clone()))
            }
        }
    }

    /// 仅当槽位尚未提交时写入
    pub fn set(&mut self, slot: SlotName, value: SlotValue, source: SlotSource) -> SetOutcome {
        if self.slots.status(slot) == SlotStatus::Committed {
            tracing::debug!(slot = %slot, "slot already committed, ignoring write");
            return SetOutcome::Ignored;
        }
        self.write(slot, value, source)
    }

    /// 用户显式更正：即使已提交也覆盖，并重新开始来源记录。
    /// 新值校验失败时原值保持不变；非 ISO 日期只形成提议，确认前保留已提交日期。
    pub fn correct(&mut self, slot: SlotName, value: SlotValue, source: SlotSource) -> SetOutcome {
        let normalized = match normalize(slot, &value) {
            Ok(v) => v,
            Err(reason) => return SetOutcome::Rejected(reason),
        };
        if let (SlotName::StartDate, SlotValue::Text(text)) = (slot, &normalized) {
            if parse_iso_date(text).is_none() {
                return match parse_loose_date(text) {
                    Some(date) => {
                        tracing::info!(date = %date, "start date correction proposed");
                        self.proposed_start_date = Some(date);
                        SetOutcome::Proposed(date)
                    }
                    None => SetOutcome::Rejected(format!("unrecognized date '{text}'")),
                };
            }
        }
        self.clear(slot);
        self.slots.restart(slot);
        tracing::info!(slot = %slot, value = %normalized, "slot corrected by user");
        self.write(slot, normalized, source)
    }

    fn write(&mut self, slot: SlotName, value: SlotValue, source: SlotSource) -> SetOutcome {
        let value = match normalize(slot, &value) {
            Ok(v) => v,
            Err(reason) => return SetOutcome::Rejected(reason),
        };

        match (slot, &value) {
            (SlotName::StartDate, SlotValue::Text(text)) => {
                if let Some(date) = parse_iso_date(text) {
                    self.start_date = Some(text.clone());
                    self.committed_start_date = Some(date);
                    self.proposed_start_date = None;
                } else if let Some(date) = parse_loose_date(text) {
                    self.proposed_start_date = Some(date);
                    return SetOutcome::Proposed(date);
                } else {
                    return SetOutcome::Rejected(format!("unrecognized date '{text}'"));
                }
            }
            (SlotName::OriginCity, SlotValue::Text(s)) => self.origin_city = Some(s.clone()),
            (SlotName::Destination, SlotValue::Text(s)) => self.destination = Some(s.clone()),
            (SlotName::Currency, SlotValue::Text(s)) => self.currency = Some(s.clone()),
            (SlotName::Budget, SlotValue::Text(s)) => self.budget = Some(s.clone()),
            (SlotName::DurationDays, SlotValue::Count(n)) => self.duration_days = Some(*n),
            (SlotName::TravelerCount, SlotValue::Count(n)) => self.traveler_count = Some(*n),
            (SlotName::Interests, SlotValue::List(items)) => self.interests = items.clone(),
            _ => return SetOutcome::Rejected(format!("unexpected value for {slot}")),
        }

        self.slots.commit(slot, value, source);
        SetOutcome::Committed
    }

    fn clear(&mut self, slot: SlotName) {
        match slot {
            SlotName::OriginCity => self.origin_city = None,
            SlotName::Destination => self.destination = None,
            SlotName::StartDate => {
                self.start_date = None;
                self.committed_start_date = None;
                self.proposed_start_date = None;
            }
            SlotName::DurationDays => self.duration_days = None,
            SlotName::TravelerCount => self.traveler_count = None,
            SlotName::Currency => self.currency = None,
            SlotName::Budget => self.budget = None,
            SlotName::Interests => self.interests.clear(),
        }
    }

    /// 记录一个待确认的日期（例如从「下周五」推断出的日期）
    pub fn propose_start_date(&mut self, date: NaiveDate) {
        if self.committed_start_date.is_none() {
            self.proposed_start_date = Some(date);
        }
    }

    /// 用户确认提议日期后提交；没有提议时返回 false。
    /// 已提交日期时，确认的是一次更正，来源记录重新开始。
    pub fn confirm_proposed_date(&mut self, source: SlotSource) -> bool {
        let Some(date) = self.proposed_start_date.take() else {
            return false;
        };
        if self.slots.status(SlotName::StartDate) == SlotStatus::Committed {
            self.slots.restart(SlotName::StartDate);
        }
        self.start_date = None;
        self.committed_start_date = Some(date);
        self.slots
            .commit(SlotName::StartDate, SlotValue::Text(date.to_string()), source);
        tracing::info!(date = %date, "proposed start date confirmed");
        true
    }

    /// 用户拒绝提议日期；已提交日期保持不变
    pub fn discard_proposed_date(&mut self) -> bool {
        self.proposed_start_date.take().is_some()
    }

    /// 已提交日期之上挂起的更正提议，等待用户确认
    pub fn pending_date_correction(&self) -> Option<MissingSlot> {
        self.committed_start_date?;
        self.proposed_start_date.map(|date| MissingSlot {
            slot: SlotName::StartDate,
            proposal: Some(date),
        })
    }

    pub fn status(&self, slot: SlotName) -> SlotStatus {
        self.slots.status(slot)
    }

    pub fn provenance(&self, slot: SlotName) -> Option<&Provenance> {
        self.slots.provenance(slot)
    }

    pub fn mark_asked(&mut self, slot: SlotName) {
        self.slots.mark_asked(slot);
    }

    /// 是否已进入规划对话（有任何槽位被问过或提交过）
    pub fn planning_engaged(&self) -> bool {
        self.slots.any_engaged() || self.proposed_start_date.is_some()
    }

    fn is_filled(&self, slot: SlotName) -> bool {
        match slot {
            SlotName::StartDate => {
                self.start_date.is_some() || self.committed_start_date.is_some()
            }
            other => self.get(other).is_some(),
        }
    }

    /// 按给定优先级返回第一个未填槽位；日期槽位附带提议日期
    pub fn next_missing(&self, order: &[SlotName]) -> Option<MissingSlot> {
        order
            .iter()
            .copied()
            .find(|slot| !self.is_filled(*slot))
            .map(|slot| MissingSlot {
                slot,
                proposal: if slot == SlotName::StartDate {
                    self.proposed_start_date
                } else {
                    None
                },
            })
    }

    pub fn has(&self, key: ContextKey) -> bool {
        match key {
            ContextKey::OriginCity => self.origin_city.is_some(),
            ContextKey::Destination => self.destination.is_some(),
            ContextKey::CommittedStartDate => self.committed_start_date.is_some(),
            ContextKey::DurationDays => self.duration_days.is_some(),
        }
    }

    pub fn signature(&self) -> TripSignature {
        TripSignature {
            origin_city: self.origin_city.clone(),
            destination: self.destination.clone(),
            committed_start_date: self.committed_start_date,
            duration_days: self.duration_days,
            traveler_count: self.traveler_count,
        }
    }

    pub fn origin_city(&self) -> Option<&str> {
        self.origin_city.as_deref()
    }

    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    pub fn committed_start_date(&self) -> Option<NaiveDate> {
        self.committed_start_date
    }

    pub fn proposed_start_date(&self) -> Option<NaiveDate> {
        self.proposed_start_date
    }

    pub fn duration_days(&self) -> Option<u32> {
        self.duration_days
    }

    pub fn traveler_count(&self) -> Option<u32> {
        self.traveler_count
    }

    pub fn currency(&self) -> Option<&str> {
        self.currency.as_deref()
    }

    pub fn budget(&self) -> Option<&str> {
        self.budget.as_deref()
    }

    pub fn interests(&self) -> &[String] {
        &self.interests
    }

    pub fn flight_cost(&self) -> Option<f64> {
        self.flight_cost
    }

    pub fn flight_currency(&self) -> Option<&str> {
        self.flight_currency.as_deref()
    }

    pub fn weather_snapshot(&self) -> Option<&WeatherSnapshot> {
        self.weather_snapshot.as_ref()
    }

    pub(crate) fn record_flight_cost(&mut self, price: f64, currency: &str) {
        self.flight_cost = Some(price);
        self.flight_currency = Some(currency.to_string());
    }

    pub(crate) fn record_weather(&mut self, snapshot: WeatherSnapshot) {
        self.weather_snapshot = Some(snapshot);
    }

    /// 计划重建时派生字段随旧结果一起失效
    pub(crate) fn clear_derived(&mut self) {
        self.flight_cost = None;
        self.flight_currency = None;
        self.weather_snapshot = None;
    }

    /// 行程摘要（传给行程组装工具）
    pub fn summary_json(&self) -> serde_json::Value {
        serde_json::json!({
            "origin_city": self.origin_city,
            "destination": self.destination,
            "start_date": self.committed_start_date.map(|d| d.to_string()),
            "duration_days": self.duration_days,
            "traveler_count": self.traveler_count,
            "currency": self.currency,
            "budget": self.budget,
            "interests": self.interests,
            "flight_cost": self.flight_cost,
            "flight_currency": self.flight_currency,
        })
    }
}

/// 清洗并校验值的形状
fn normalize(slot: SlotName, value: &SlotValue) -> Result<SlotValue, String> {
    match slot {
        SlotName::DurationDays | SlotName::TravelerCount => {
            let max = if slot == SlotName::DurationDays {
                MAX_TRIP_DAYS
            } else {
                MAX_TRAVELERS
            };
            match value.as_count() {
                Some(n) if (1..=max).contains(&n) => Ok(SlotValue::Count(n)),
                Some(n) if n > max => Err(format!("{slot} must be at most {max}")),
                _ => Err(format!("{slot} must be a positive whole number")),
            }
        }
        SlotName::Interests => match value {
            SlotValue::List(items) => Ok(SlotValue::List(
                items
                    .iter()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            )),
            SlotValue::Text(s) => Ok(SlotValue::List(
                s.split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect(),
            )),
            SlotValue::Count(_) => Err("interests must be text".to_string()),
        },
        _ => {
            let text = match value {
                SlotValue::Text(s) => s.trim().to_string(),
                SlotValue::Count(n) => n.to_string(),
                SlotValue::List(_) => return Err(format!("{slot} must be text")),
            };
            if text.is_empty() {
                return Err(format!("{slot} is empty"));
            }
            if slot == SlotName::Currency {
                return Ok(SlotValue::Text(text.to_uppercase()));
            }
            Ok(SlotValue::Text(text))
        }
    }
}

/// 严格 ISO（YYYY-MM-DD）
pub fn parse_iso_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()
}

pub fn parse_loose_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    LOOSE_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}
