//! 语义分类器接缝
//!
//! 核心只依赖 classify_intent / extract_slots 的结果形状；KeywordClassifier 是离线默认实现，
//! 用关键词与正则做快速匹配（不调用 LLM），可被任何实现 SemanticClassifier 的后端替换。

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::context::TripContext;
use super::slots::{SlotName, SlotSource, SlotStatus, SlotValue, REQUIRED_SLOT_ORDER};
use crate::core::TripError;
use crate::memory::Message;

/// 识别出的意图
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// 浏览建议（去哪玩、有什么推荐）
    Explore,
    /// 准备规划具体行程
    Plan,
    /// 普通对话
    Chat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentDecision {
    pub intent: Intent,
    pub ready_to_plan: bool,
}

/// 单个抽取出的槽位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedSlot {
    pub slot: SlotName,
    pub value: SlotValue,
    pub source: SlotSource,
}

/// extract_slots 的部分槽位结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotExtraction {
    pub slots: Vec<ExtractedSlot>,
    /// 用户确认了之前提议的日期
    pub confirms_proposed_date: bool,
    /// 用户拒绝了之前提议的日期
    #[serde(default)]
    pub declines_proposed_date: bool,
    /// 用户在更正已给出的参数
    pub is_correction: bool,
}

impl SlotExtraction {
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty() && !self.confirms_proposed_date && !self.declines_proposed_date
    }

    fn push(&mut self, slot: SlotName, value: SlotValue) {
        if self.slots.iter().any(|s| s.slot == slot) {
            return;
        }
        self.slots.push(ExtractedSlot {
            slot,
            value,
            source: SlotSource::User,
        });
    }
}

/// 意图分类与槽位抽取能力
#[async_trait]
pub trait SemanticClassifier: Send + Sync {
    async fn classify_intent(
        &self,
        text: &str,
        history: &[Message],
    ) -> Result<IntentDecision, TripError>;

    async fn extract_slots(
        &self,
        text: &str,
        context: &TripContext,
    ) -> Result<SlotExtraction, TripError>;
}

const EXPLORE_WORDS: [&str; 7] = [
    "suggest",
    "recommend",
    "ideas",
    "where should",
    "places",
    "destinations",
    "options",
];

const PLAN_WORDS: [&str; 10] = [
    "plan",
    "book",
    "itinerary",
    "lets go",
    "let's go",
    "trip to",
    "travel to",
    "fly to",
    "flying to",
    "going to",
];

const CONFIRM_WORDS: [&str; 9] = [
    "yes",
    "yep",
    "yeah",
    "sure",
    "confirm",
    "sounds good",
    "that works",
    "ok",
    "okay",
];

const CORRECTION_WORDS: [&str; 6] = [
    "actually", "instead", "change", "make it", "switch", "rather",
];

/// 离线关键词分类器
#[derive(Debug, Default, Clone)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }

    fn fast_match(input: &str) -> IntentDecision {
        let lower = input.to_lowercase();
        if EXPLORE_WORDS.iter().any(|w| lower.contains(w)) {
            return IntentDecision {
                intent: Intent::Explore,
                ready_to_plan: false,
            };
        }
        if PLAN_WORDS.iter().any(|w| lower.contains(w)) {
            return IntentDecision {
                intent: Intent::Plan,
                ready_to_plan: true,
            };
        }
        IntentDecision {
            intent: Intent::Chat,
            ready_to_plan: false,
        }
    }

    /// 规则抽取；未命中任何规则时，把简短回答填进正在追问的槽位
    pub fn extract(input: &str, context: &TripContext) -> SlotExtraction {
        let mut out = SlotExtraction::default();
        let lower = input.to_lowercase();

        if let Some(m) = iso_date_re().find(input) {
            out.push(SlotName::StartDate, SlotValue::Text(m.as_str().to_string()));
        } else if let Some(m) = loose_date_re().find(input) {
            out.push(SlotName::StartDate, SlotValue::Text(m.as_str().to_string()));
        }

        if let Some(c) = duration_re().captures(&lower) {
            if let Ok(n) = c[1].parse::<u32>() {
                let days = if c[2].starts_with("week") {
                    n.checked_mul(7)
                } else {
                    Some(n)
                };
                if let Some(days) = days {
                    out.push(SlotName::DurationDays, SlotValue::Count(days));
                }
            }
        }

        if let Some(c) = travelers_re().captures(&lower) {
            if let Ok(n) = c[1].parse::<u32>() {
                out.push(SlotName::TravelerCount, SlotValue::Count(n));
            }
        } else if lower.contains("solo") || lower.contains("just me") {
            out.push(SlotName::TravelerCount, SlotValue::Count(1));
        }

        if let Some(c) = origin_re().captures(input) {
            out.push(SlotName::OriginCity, SlotValue::Text(title_case(&c[1])));
        }
        if let Some(c) = destination_re().captures(input) {
            out.push(SlotName::Destination, SlotValue::Text(title_case(&c[2])));
        }

        if let Some(c) = currency_re().captures(&lower) {
            out.push(SlotName::Currency, SlotValue::Text(c[1].to_uppercase()));
        }
        if let Some(c) = budget_re().captures(input) {
            out.push(SlotName::Budget, SlotValue::Text(c[1].trim().to_string()));
        }
        if let Some(c) = interests_re().captures(input) {
            let joined = c[1].replace(" and ", ",");
            out.push(SlotName::Interests, SlotValue::Text(joined));
        }

        out.is_correction = CORRECTION_WORDS.iter().any(|w| lower.contains(w));
        out.confirms_proposed_date =
            context.proposed_start_date().is_some() && is_confirmation(&lower);
        out.declines_proposed_date = context.proposed_start_date().is_some()
            && !out.confirms_proposed_date
            && !out.slots.iter().any(|s| s.slot == SlotName::StartDate)
            && has_negation(&lower);

        let is_filler = CONFIRM_WORDS.contains(&lower.trim()) || lower.trim() == "no";
        if out.slots.is_empty() && !out.confirms_proposed_date && !is_filler {
            if let Some(slot) = pending_question(context) {
                if let Some(value) = bare_answer(slot, input) {
                    out.push(slot, value);
                }
            }
        }
        out
    }
}

#[async_trait]
impl SemanticClassifier for KeywordClassifier {
    async fn classify_intent(
        &self,
        text: &str,
        _history: &[Message],
    ) -> Result<IntentDecision, TripError> {
        Ok(Self::fast_match(text))
    }

    async fn extract_slots(
        &self,
        text: &str,
        context: &TripContext,
    ) -> Result<SlotExtraction, TripError> {
        Ok(Self::extract(text, context))
    }
}

const NEGATION_WORDS: [&str; 4] = ["no", "not", "nope", "don't"];

/// 按整词匹配确认短语；出现否定词时不算确认
fn is_confirmation(lower: &str) -> bool {
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|t| !t.is_empty())
        .collect();
    if has_negation(lower) {
        return false;
    }
    let padded = format!(" {} ", tokens.join(" "));
    CONFIRM_WORDS.iter().any(|w| padded.contains(&format!(" {w} ")))
}

fn has_negation(lower: &str) -> bool {
    lower
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .any(|t| NEGATION_WORDS.contains(&t))
}

/// 已向用户追问、尚未填上的第一个必填槽位
fn pending_question(context: &TripContext) -> Option<SlotName> {
    let missing = context.next_missing(&REQUIRED_SLOT_ORDER)?;
    (context.status(missing.slot) == SlotStatus::Asked).then_some(missing.slot)
}

fn bare_answer(slot: SlotName, input: &str) -> Option<SlotValue> {
    let trimmed = input.trim().trim_end_matches(['.', '!']);
    match slot {
        SlotName::DurationDays | SlotName::TravelerCount => {
            trimmed.parse::<u32>().ok().map(SlotValue::Count)
        }
        SlotName::OriginCity | SlotName::Destination => {
            let words = trimmed.split_whitespace().count();
            let alphabetic = trimmed.chars().all(|c| c.is_alphabetic() || c == ' ' || c == '-');
            (words > 0 && words <= 3 && alphabetic).then(|| SlotValue::Text(title_case(trimmed)))
        }
        _ => None,
    }
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

static ISO_DATE_RE: OnceLock<Regex> = OnceLock::new();
static LOOSE_DATE_RE: OnceLock<Regex> = OnceLock::new();
static DURATION_RE: OnceLock<Regex> = OnceLock::new();
static TRAVELERS_RE: OnceLock<Regex> = OnceLock::new();
static ORIGIN_RE: OnceLock<Regex> = OnceLock::new();
static DESTINATION_RE: OnceLock<Regex> = OnceLock::new();
static CURRENCY_RE: OnceLock<Regex> = OnceLock::new();
static BUDGET_RE: OnceLock<Regex> = OnceLock::new();
static INTERESTS_RE: OnceLock<Regex> = OnceLock::new();

const MONTHS: &str = "jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec";
const CITY_STOP: &str = r"(?:\s+(?:to|from|on|for|in|with|next|this|and|by|starting)\b|[,.!?]|$)";

fn iso_date_re() -> &'static Regex {
    ISO_DATE_RE.get_or_init(|| Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").unwrap())
}

fn loose_date_re() -> &'static Regex {
    LOOSE_DATE_RE.get_or_init(|| {
        Regex::new(&format!(
            concat!(
                r"(?i)\b(?:\d{{1,2}}\s+(?:{MONTHS})[a-z]*,?\s+\d{{4}}",
                r"|(?:{MONTHS})[a-z]*\s+\d{{1,2}},?\s+\d{{4}}",
                r"|\d{{1,2}}/\d{{1,2}}/\d{{4}})\b"
            ),
            MONTHS = MONTHS,
        ))
        .unwrap()
    })
}

fn duration_re() -> &'static Regex {
    DURATION_RE.get_or_init(|| Regex::new(r"(\d+)\s*-?\s*(days?|weeks?)\b").unwrap())
}

fn travelers_re() -> &'static Regex {
    TRAVELERS_RE.get_or_init(|| {
        Regex::new(r"(\d+)\s*(?:people|persons?|travell?ers?|adults|pax|of us)\b").unwrap()
    })
}

fn origin_re() -> &'static Regex {
    ORIGIN_RE.get_or_init(|| {
        Regex::new(&format!(r"(?i)\bfrom\s+([a-z][a-z ]*?){CITY_STOP}")).unwrap()
    })
}

fn destination_re() -> &'static Regex {
    DESTINATION_RE.get_or_init(|| {
        Regex::new(&format!(
            concat!(
                r"(?i)\b(trip to|travel to|travell?ing to|fly to|flying to|go to|going to",
                r"|visit|visiting|destination is)\s+([a-z][a-z ]*?){CITY_STOP}"
            ),
            CITY_STOP = CITY_STOP,
        ))
        .unwrap()
    })
}

fn currency_re() -> &'static Regex {
    CURRENCY_RE.get_or_init(|| Regex::new(r"\b(usd|inr|eur|gbp|aud|cad|jpy|sgd|aed)\b").unwrap())
}

fn budget_re() -> &'static Regex {
    BUDGET_RE.get_or_init(|| {
        Regex::new(concat!(
            r"(?i)budget\s+(?:of\s+|is\s+|around\s+)?",
            r"([₹$€£]?\s?\d[\d,]*(?:\.\d+)?\s?k?(?:\s?(?:usd|inr|eur|gbp|rupees|dollars))?)"
        ))
        .unwrap()
    })
}

fn interests_re() -> &'static Regex {
    INTERESTS_RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:interested in|interests are)\s+([^.!?]+)").unwrap()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value_of(out: &SlotExtraction, slot: SlotName) -> Option<SlotValue> {
        out.slots.iter().find(|s| s.slot == slot).map(|s| s.value.clone())
    }

    #[test]
    fn test_fast_match_intents() {
        assert_eq!(
            KeywordClassifier::fast_match("Suggest some beach places").intent,
            Intent::Explore
        );
        let plan = KeywordClassifier::fast_match("Plan a trip to Goa");
        assert_eq!(plan.intent, Intent::Plan);
        assert!(plan.ready_to_plan);
        assert_eq!(KeywordClassifier::fast_match("hello there").intent, Intent::Chat);
    }

    #[test]
    fn test_extracts_full_request() {
        let ctx = TripContext::new();
        let out = KeywordClassifier::extract(
            "Plan a trip to Goa from Delhi on 2025-12-10 for 4 days, 2 people",
            &ctx,
        );
        assert_eq!(value_of(&out, SlotName::Destination), Some(SlotValue::Text("Goa".into())));
        assert_eq!(value_of(&out, SlotName::OriginCity), Some(SlotValue::Text("Delhi".into())));
        assert_eq!(value_of(&out, SlotName::StartDate), Some(SlotValue::Text("2025-12-10".into())));
        assert_eq!(value_of(&out, SlotName::DurationDays), Some(SlotValue::Count(4)));
        assert_eq!(value_of(&out, SlotName::TravelerCount), Some(SlotValue::Count(2)));
        assert!(!out.is_correction);
    }

    #[test]
    fn test_loose_date_and_week() {
        let ctx = TripContext::new();
        let out = KeywordClassifier::extract("leaving 10 December 2025 for 1 week", &ctx);
        assert_eq!(
            value_of(&out, SlotName::StartDate),
            Some(SlotValue::Text("10 December 2025".into()))
        );
        assert_eq!(value_of(&out, SlotName::DurationDays), Some(SlotValue::Count(7)));
    }

    #[test]
    fn test_bare_answer_fills_asked_slot() {
        let mut ctx = TripContext::new();
        ctx.set(SlotName::OriginCity, SlotValue::Text("Delhi".into()), SlotSource::User);
        ctx.set(SlotName::Destination, SlotValue::Text("Goa".into()), SlotSource::User);
        ctx.set(SlotName::StartDate, SlotValue::Text("2025-12-10".into()), SlotSource::User);
        ctx.set(SlotName::DurationDays, SlotValue::Count(4), SlotSource::User);
        ctx.mark_asked(SlotName::TravelerCount);

        let out = KeywordClassifier::extract("3", &ctx);
        assert_eq!(value_of(&out, SlotName::TravelerCount), Some(SlotValue::Count(3)));
    }

    #[test]
    fn test_confirmation_requires_proposal() {
        let mut ctx = TripContext::new();
        assert!(!KeywordClassifier::extract("yes", &ctx).confirms_proposed_date);
        ctx.propose_start_date(chrono::NaiveDate::from_ymd_opt(2025, 12, 10).unwrap());
        assert!(KeywordClassifier::extract("Yes, that works", &ctx).confirms_proposed_date);
    }

    #[test]
    fn test_huge_week_count_is_dropped() {
        let ctx = TripContext::new();
        let out = KeywordClassifier::extract("Plan a trip to Goa for 999999999 weeks", &ctx);
        assert_eq!(value_of(&out, SlotName::DurationDays), None);
        assert_eq!(value_of(&out, SlotName::Destination), Some(SlotValue::Text("Goa".into())));
    }

    #[test]
    fn test_confirmation_matches_whole_words() {
        let mut ctx = TripContext::new();
        ctx.propose_start_date(chrono::NaiveDate::from_ymd_opt(2025, 12, 10).unwrap());
        for text in ["yesterday was fun", "okinawa sounds nice", "okay no, not that day"] {
            assert!(
                !KeywordClassifier::extract(text, &ctx).confirms_proposed_date,
                "{text}"
            );
        }
        assert!(KeywordClassifier::extract("okay no, not that day", &ctx).declines_proposed_date);
        assert!(KeywordClassifier::extract("ok", &ctx).confirms_proposed_date);
        assert!(KeywordClassifier::extract("That works.", &ctx).confirms_proposed_date);
    }

    #[test]
    fn test_correction_detected() {
        let ctx = TripContext::new();
        let out = KeywordClassifier::extract("Actually, make it a trip to Kerala", &ctx);
        assert!(out.is_correction);
        assert_eq!(value_of(&out, SlotName::Destination), Some(SlotValue::Text("Kerala".into())));
    }
}
