//! tripmind - 对话式行程规划
//!
//! 入口：初始化日志与编排器，在标准输入上运行单线程 REPL，把结构化回合结果渲染为文本。

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use serde_json::Value;
use tripmind::core::{create_orchestrator, RecoveryAction, TurnResponse, TurnStatus};
use tripmind::dialogue::{Intent, MissingSlot, SlotName};
use tripmind::planning::{InquiryAnswer, StepKind};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tripmind::observability::init();

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let orchestrator =
        create_orchestrator(config_path).context("Failed to create orchestrator")?;

    println!("Where would you like to go? (type 'quit' to exit)");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut thread_id: Option<String> = None;

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, "quit" | "exit") {
            break;
        }
        let response = orchestrator.handle_turn(thread_id.as_deref(), input).await;
        thread_id = Some(response.thread_id.clone());
        println!("{}", render(&response));
    }
    Ok(())
}

fn render(response: &TurnResponse) -> String {
    let mut out = Vec::new();
    for reason in &response.rejected {
        out.push(format!("(couldn't use {reason})"));
    }
    match response.status {
        TurnStatus::Conversation => out.push(match response.intent {
            Some(Intent::Explore) => {
                "Tell me a destination you're curious about and I can plan a trip there.".into()
            }
            _ => "Happy to help plan a trip. Where would you like to go?".into(),
        }),
        TurnStatus::NeedsSlot => {
            if let Some(missing) = &response.missing {
                out.push(question_for(missing));
            }
        }
        TurnStatus::Executed => {
            if let Some(itinerary) = &response.itinerary {
                out.push(itinerary.clone());
            }
            if let Some(summary) = &response.summary {
                out.push(summary.clone());
            }
        }
        TurnStatus::Answer => {
            if let Some(answer) = &response.answer {
                out.push(render_answer(answer));
            }
        }
        TurnStatus::Recovered => {
            let reason = response.summary.as_deref().unwrap_or("something went wrong");
            out.push(format!("Sorry, {reason}. Please try again."));
            if let Some(missing) = &response.missing {
                out.push(question_for(missing));
            }
        }
    }
    if let Some(RecoveryAction::ContinueUnsaved { .. }) = &response.recovery {
        out.push("(note: this conversation could not be saved)".into());
    }
    out.join("\n")
}

fn render_answer(answer: &InquiryAnswer) -> String {
    let topic = match answer.topic {
        StepKind::Flights => "flights",
        StepKind::Weather => "the weather",
        StepKind::Activities => "activities",
        StepKind::Nearby => "nearby places",
        StepKind::Budget => "the budget",
        StepKind::Assemble => "the itinerary",
    };
    if let Some(error) = &answer.error {
        return format!("I couldn't get {topic} earlier ({error}). Change a detail to retry.");
    }
    match (answer.topic, &answer.result) {
        (StepKind::Flights, Some(result)) => {
            let price = result.get("min_price").and_then(Value::as_f64);
            let currency = result.get("currency").and_then(Value::as_str).unwrap_or("");
            let count = result
                .get("offers")
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            match price {
                Some(price) => format!("Cheapest of {count} flight offers: {price} {currency}"),
                None => format!("{count} flight offers found."),
            }
        }
        (StepKind::Weather, Some(result)) => {
            let summary = result.get("summary").and_then(Value::as_str).unwrap_or("");
            let date = result.get("date").and_then(Value::as_str).unwrap_or("your dates");
            format!("Weather for {date}: {summary}")
        }
        (_, Some(Value::String(text))) => text.clone(),
        (_, Some(other)) => other.to_string(),
        (_, None) => format!("I don't have {topic} for this trip yet."),
    }
}

fn question_for(missing: &MissingSlot) -> String {
    if let Some(date) = missing.proposal {
        return format!("Did you mean {date} as your start date? (yes to confirm)");
    }
    match missing.slot {
        SlotName::OriginCity => "Which city are you travelling from?".into(),
        SlotName::Destination => "Where would you like to go?".into(),
        SlotName::StartDate => "When do you want to leave? (YYYY-MM-DD)".into(),
        SlotName::DurationDays => "How many days will the trip be?".into(),
        SlotName::TravelerCount => "How many people are travelling?".into(),
        other => format!("What is your {other}?"),
    }
}
