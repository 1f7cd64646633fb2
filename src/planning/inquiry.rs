//! 行程追问：计划执行完毕后，按关键词把追问映射到某个步骤，直接返回结果映射中的记录
//!
//! 只负责匹配与取数，措辞由渲染层决定。

use serde::Serialize;
use serde_json::Value;

use super::types::{Plan, ResultMap, StepKind, StepStatus};

/// 按优先级排列：先命中的步骤胜出
const TOPIC_KEYWORDS: [(StepKind, &[&str]); 6] = [
    (
        StepKind::Weather,
        &["weather", "temperature", "rain", "raining", "climate", "forecast"],
    ),
    (
        StepKind::Activities,
        &[
            "activities",
            "activity",
            "things to do",
            "attractions",
            "places to visit",
            "sightseeing",
        ],
    ),
    (
        StepKind::Nearby,
        &["nearby", "near", "close to", "vicinity", "surroundings"],
    ),
    (
        StepKind::Budget,
        &[
            "budget", "cost", "costs", "expense", "expenses", "money", "spend", "hotel", "hotels",
            "lodging", "accommodation", "food", "restaurants",
        ],
    ),
    (
        StepKind::Flights,
        &["flight", "flights", "plane", "airline", "airlines", "airport", "fly", "fare"],
    ),
    (
        StepKind::Assemble,
        &["itinerary", "schedule", "overview", "summary"],
    ),
];

/// 整词匹配追问主题；都不命中时返回 None
pub fn inquiry_topic(text: &str) -> Option<StepKind> {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let padded = format!(" {} ", words.join(" "));
    TOPIC_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| padded.contains(&format!(" {k} "))))
        .map(|(kind, _)| *kind)
}

/// 追问的结构化答复
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InquiryAnswer {
    pub topic: StepKind,
    /// 步骤不在计划中（前置槽位缺失）时为 None
    pub status: Option<StepStatus>,
    pub error: Option<String>,
    /// 结果映射中该步骤的记录
    pub result: Option<Value>,
}

pub fn answer_inquiry(plan: &Plan, results: &ResultMap, topic: StepKind) -> InquiryAnswer {
    let step = plan.step(topic);
    InquiryAnswer {
        topic,
        status: step.map(|s| s.status),
        error: step.and_then(|s| s.issue_line()),
        result: results.get(topic.output_key()).cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogue::{SlotName, SlotSource, SlotValue, TripContext};
    use crate::planning::build_plan;
    use serde_json::json;

    #[test]
    fn test_topic_matches_whole_words() {
        assert_eq!(inquiry_topic("How's the weather there?"), Some(StepKind::Weather));
        assert_eq!(inquiry_topic("What can we do nearby?"), Some(StepKind::Nearby));
        assert_eq!(inquiry_topic("How much will it cost?"), Some(StepKind::Budget));
        assert_eq!(inquiry_topic("Which airline is cheapest?"), Some(StepKind::Flights));
        assert_eq!(inquiry_topic("Show me the itinerary"), Some(StepKind::Assemble));
        assert_eq!(inquiry_topic("Is there a train option?"), None);
        assert_eq!(inquiry_topic("thanks!"), None);
    }

    #[test]
    fn test_answer_reads_result_map() {
        let mut ctx = TripContext::new();
        ctx.set(SlotName::Destination, SlotValue::Text("Goa".into()), SlotSource::User);
        let plan = build_plan(&ctx);
        let mut results = ResultMap::new();
        results.insert("activities".into(), json!("1. Beach walk"));

        let answer = answer_inquiry(&plan, &results, StepKind::Activities);
        assert_eq!(answer.status, Some(StepStatus::Pending));
        assert_eq!(answer.result, Some(json!("1. Beach walk")));

        let missing = answer_inquiry(&plan, &results, StepKind::Flights);
        assert_eq!(missing.status, None);
        assert_eq!(missing.result, None);
    }
}
