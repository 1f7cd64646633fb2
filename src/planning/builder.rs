//! 计划构建
//!
//! 步骤是否出现只取决于其前置键是否都在上下文中（存在即就绪）；
//! 顺序固定为 flights, weather, activities, nearby, budget, assemble，过滤后编号 1..N。

use crate::dialogue::TripContext;
use crate::planning::types::{Plan, PlanStep, StepKind};

pub fn build_plan(context: &TripContext) -> Plan {
    let steps = StepKind::ORDER
        .iter()
        .copied()
        .filter(|kind| kind.requires().iter().all(|key| context.has(*key)))
        .enumerate()
        .map(|(i, kind)| PlanStep::new(i + 1, kind))
        .collect();

    Plan {
        steps,
        signature: context.signature(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogue::{SlotName, SlotSource, SlotValue};
    use crate::planning::StepStatus;

    fn ctx(pairs: &[(SlotName, &str)]) -> TripContext {
        let mut c = TripContext::new();
        for (slot, value) in pairs {
            let v = match slot {
                SlotName::DurationDays | SlotName::TravelerCount => {
                    SlotValue::Count(value.parse().unwrap())
                }
                _ => SlotValue::Text(value.to_string()),
            };
            c.set(*slot, v, SlotSource::User);
        }
        c
    }

    #[test]
    fn test_empty_context_only_assembles() {
        let plan = build_plan(&TripContext::new());
        assert_eq!(plan.kinds(), vec![StepKind::Assemble]);
        assert_eq!(plan.steps[0].id, 1);
    }

    #[test]
    fn test_destination_only() {
        let plan = build_plan(&ctx(&[(SlotName::Destination, "Goa")]));
        assert_eq!(
            plan.kinds(),
            vec![StepKind::Activities, StepKind::Nearby, StepKind::Assemble]
        );
        assert_eq!(plan.steps.iter().map(|s| s.id).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_full_context_keeps_fixed_order() {
        let c = ctx(&[
            (SlotName::OriginCity, "Delhi"),
            (SlotName::Destination, "Goa"),
            (SlotName::StartDate, "2025-12-10"),
            (SlotName::DurationDays, "4"),
            (SlotName::TravelerCount, "2"),
        ]);
        let plan = build_plan(&c);
        assert_eq!(plan.kinds(), StepKind::ORDER.to_vec());
        assert!(plan.steps.iter().all(|s| s.status == StepStatus::Pending));
        assert_eq!(build_plan(&c), plan);
    }

    #[test]
    fn test_proposed_date_does_not_admit_flights() {
        let mut c = ctx(&[
            (SlotName::OriginCity, "Delhi"),
            (SlotName::Destination, "Goa"),
        ]);
        c.set(
            SlotName::StartDate,
            SlotValue::Text("10 December 2025".into()),
            SlotSource::User,
        );
        let plan = build_plan(&c);
        assert!(plan.step(StepKind::Flights).is_none());
        assert!(plan.step(StepKind::Weather).is_none());
    }

    #[test]
    fn test_missing_prerequisite_never_included() {
        let without_dest = ctx(&[
            (SlotName::OriginCity, "Delhi"),
            (SlotName::StartDate, "2025-12-10"),
            (SlotName::DurationDays, "4"),
        ]);
        let plan = build_plan(&without_dest);
        for step in &plan.steps {
            assert!(step.requires.iter().all(|k| without_dest.has(*k)));
        }
        assert_eq!(plan.kinds(), vec![StepKind::Assemble]);
    }
}
