//! 槽位追踪：状态机 + 来源记录
//!
//! 每个槽位 unfilled → asked → committed；committed 只能被用户显式更正重置，
//! 更正会重新开始该槽位的 Provenance。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 被追踪的行程参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotName {
    OriginCity,
    Destination,
    StartDate,
    DurationDays,
    TravelerCount,
    Currency,
    Budget,
    Interests,
}

/// 追问顺序：出发城市、目的地、出发日期、天数、人数
pub const REQUIRED_SLOT_ORDER: [SlotName; 5] = [
    SlotName::OriginCity,
    SlotName::Destination,
    SlotName::StartDate,
    SlotName::DurationDays,
    SlotName::TravelerCount,
];

impl SlotName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OriginCity => "origin_city",
            Self::Destination => "destination",
            Self::StartDate => "start_date",
            Self::DurationDays => "duration_days",
            Self::TravelerCount => "traveler_count",
            Self::Currency => "currency",
            Self::Budget => "budget",
            Self::Interests => "interests",
        }
    }
}

impl std::fmt::Display for SlotName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 槽位生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    #[default]
    Unfilled,
    /// 已向用户发出澄清问题
    Asked,
    Committed,
}

/// 槽位值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SlotValue {
    Text(String),
    Count(u32),
    List(Vec<String>),
}

impl SlotValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Count，或可解析为正整数的文本
    pub fn as_count(&self) -> Option<u32> {
        match self {
            Self::Count(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
            Self::List(_) => None,
        }
    }
}

impl std::fmt::Display for SlotValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Count(n) => write!(f, "{n}"),
            Self::List(items) => f.write_str(&items.join(", ")),
        }
    }
}

/// 值的提供方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotSource {
    /// 用户明确给出
    User,
    /// 从对话上下文推断
    Inferred,
}

/// 已提交槽位的来源记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub value: SlotValue,
    pub source: SlotSource,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SlotRecord {
    status: SlotStatus,
    provenance: Option<Provenance>,
}

/// 槽位状态表
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlotTracker {
    records: HashMap<SlotName, SlotRecord>,
}

impl SlotTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self, slot: SlotName) -> SlotStatus {
        self.records
            .get(&slot)
            .map(|r| r.status)
            .unwrap_or_default()
    }

    pub fn provenance(&self, slot: SlotName) -> Option<&Provenance> {
        self.records.get(&slot).and_then(|r| r.provenance.as_ref())
    }

    /// unfilled → asked；其它状态不变
    pub fn mark_asked(&mut self, slot: SlotName) {
        let record = self.records.entry(slot).or_default();
        if record.status == SlotStatus::Unfilled {
            record.status = SlotStatus::Asked;
        }
    }

    /// 提交槽位；Provenance 只在缺失时写入（先写者胜）
    pub fn commit(&mut self, slot: SlotName, value: SlotValue, source: SlotSource) {
        let record = self.records.entry(slot).or_default();
        record.status = SlotStatus::Committed;
        if record.provenance.is_none() {
            record.provenance = Some(Provenance {
                value,
                source,
                recorded_at: Utc::now(),
            });
        }
    }

    /// 用户显式更正：丢弃旧来源，从 unfilled 重新开始
    pub fn restart(&mut self, slot: SlotName) {
        self.records.insert(slot, SlotRecord::default());
    }

    /// 任何状态非 unfilled 的槽位（用于判断是否已进入规划对话）
    pub fn any_engaged(&self) -> bool {
        self.records
            .values()
            .any(|r| r.status != SlotStatus::Unfilled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_unfilled_asked_committed() {
        let mut tracker = SlotTracker::new();
        assert_eq!(tracker.status(SlotName::Destination), SlotStatus::Unfilled);
        tracker.mark_asked(SlotName::Destination);
        assert_eq!(tracker.status(SlotName::Destination), SlotStatus::Asked);
        tracker.commit(
            SlotName::Destination,
            SlotValue::Text("Goa".into()),
            SlotSource::User,
        );
        assert_eq!(tracker.status(SlotName::Destination), SlotStatus::Committed);
        tracker.mark_asked(SlotName::Destination);
        assert_eq!(tracker.status(SlotName::Destination), SlotStatus::Committed);
    }

    #[test]
    fn test_first_writer_wins_until_restart() {
        let mut tracker = SlotTracker::new();
        tracker.commit(
            SlotName::OriginCity,
            SlotValue::Text("Delhi".into()),
            SlotSource::Inferred,
        );
        tracker.commit(
            SlotName::OriginCity,
            SlotValue::Text("Mumbai".into()),
            SlotSource::User,
        );
        let prov = tracker.provenance(SlotName::OriginCity).unwrap();
        assert_eq!(prov.value, SlotValue::Text("Delhi".into()));
        assert_eq!(prov.source, SlotSource::Inferred);

        tracker.restart(SlotName::OriginCity);
        assert!(tracker.provenance(SlotName::OriginCity).is_none());
        tracker.commit(
            SlotName::OriginCity,
            SlotValue::Text("Mumbai".into()),
            SlotSource::User,
        );
        assert_eq!(
            tracker.provenance(SlotName::OriginCity).unwrap().value,
            SlotValue::Text("Mumbai".into())
        );
    }
}
