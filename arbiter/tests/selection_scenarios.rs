//! End-to-end selection scenarios: judge → classify → select.

mod common;

use std::sync::Arc;

use arbiter::{
    Advisor, AdvisorBrief, AdvisorChoice, EscalationState, EscalationTier, EvaluationInput, Judge,
    OutcomeCase, QualityTier, SelectionFailure, SelectionMethod,
};
use async_trait::async_trait;
use common::{arbiter, checks, config, strings, ScriptedJudge, TierProducer};
use mockall::mock;
use tokio_util::sync::CancellationToken;

mock! {
    pub RemoteJudge {}

    #[async_trait]
    impl Judge for RemoteJudge {
        async fn judge(&self, sql: &str, tests: &[String]) -> anyhow::Result<String>;
    }
}

fn input<'a>(candidates: &'a [String], tests: &'a [String]) -> EvaluationInput<'a> {
    EvaluationInput {
        candidates,
        tests,
        question: "Which customers ordered in 2023?",
        schema_context: "customers(id, name); orders(id, cid, year)",
        threshold_percent: 90.0,
        enhanced_enabled: false,
    }
}

#[tokio::test]
async fn test_single_perfect_candidate_is_gold() {
    let candidates = strings(&["SELECT a", "SELECT b", "SELECT c"]);
    let tests = checks(5);
    let judge = ScriptedJudge::new(&[
        ("SELECT a", "PPPFF"),
        ("SELECT b", "PPPPP"),
        ("SELECT c", "FFFFF"),
    ]);
    let arb = arbiter(config(), Arc::new(TierProducer::default()), tests.clone(), Arc::new(judge));

    let eval = arb
        .evaluate_and_select(input(&candidates, &tests), &CancellationToken::new())
        .await
        .unwrap();

    let r = eval.result;
    assert!(r.success);
    assert_eq!(r.case, Some(OutcomeCase::A));
    assert_eq!(r.tier, Some(QualityTier::Gold));
    assert_eq!(r.selected.unwrap().sql, "SELECT b");
    assert_eq!(r.metrics.total_sqls, 3);
    assert_eq!(r.metrics.pass_rates[&0].passed, 3);
}

#[tokio::test]
async fn test_two_perfect_candidates_simpler_sql_wins() {
    let simple = "SELECT name FROM customers WHERE id IN (SELECT cid FROM orders)";
    let complex = "SELECT DISTINCT c.name FROM customers c JOIN orders o ON o.cid = c.id \
                   WHERE o.year = 2023 AND c.id > 0";
    let candidates = strings(&[complex, simple]);
    let tests = checks(5);
    let judge = ScriptedJudge::new(&[(complex, "PPPPP"), (simple, "PPPPP")]);
    let arb = arbiter(config(), Arc::new(TierProducer::default()), tests.clone(), Arc::new(judge));

    let r = arb
        .evaluate_and_select(input(&candidates, &tests), &CancellationToken::new())
        .await
        .unwrap()
        .result;

    assert_eq!(r.case, Some(OutcomeCase::B));
    assert_eq!(r.tier, Some(QualityTier::Gold));
    assert_eq!(r.method, SelectionMethod::Complexity);
    assert_eq!(r.selected.unwrap().index, 1);
    assert!(r.metrics.pass_rates[&0].complexity > r.metrics.pass_rates[&1].complexity);
}

#[tokio::test]
async fn test_borderline_rates_select_silver() {
    // 16/20 = 0.80 and 19/20 = 0.95 against a 90% threshold.
    let candidates = strings(&["SELECT x", "SELECT y"]);
    let tests = checks(20);
    let judge = ScriptedJudge::new(&[
        ("SELECT x", "PPPPPPPPPPPPPPPPFFFF"),
        ("SELECT y", "PPPPPPPPPPPPPPPPPPPF"),
    ]);
    let arb = arbiter(config(), Arc::new(TierProducer::default()), tests.clone(), Arc::new(judge));

    let r = arb
        .evaluate_and_select(input(&candidates, &tests), &CancellationToken::new())
        .await
        .unwrap()
        .result;

    assert!(r.success);
    assert_eq!(r.tier, Some(QualityTier::Silver));
    assert_eq!(r.selected.unwrap().index, 1);
    assert_eq!(r.metrics.pass_rates[&0].pass_rate, Some(0.8));
    assert_eq!(r.metrics.pass_rates[&1].pass_rate, Some(0.95));
}

#[tokio::test]
async fn test_all_failed_escalates_from_basic() {
    let candidates = strings(&["SELECT p", "SELECT q"]);
    let tests = checks(4);
    let judge = ScriptedJudge::new(&[("SELECT p", "PPFF"), ("SELECT q", "PFFF")]);
    let arb = arbiter(config(), Arc::new(TierProducer::default()), tests.clone(), Arc::new(judge));

    let r = arb
        .evaluate_and_select(input(&candidates, &tests), &CancellationToken::new())
        .await
        .unwrap()
        .result;
    assert!(!r.success);
    assert_eq!(r.case, Some(OutcomeCase::D));
    assert_eq!(r.tier, Some(QualityTier::Failed));
    assert!(matches!(
        r.failure,
        Some(SelectionFailure::BelowThreshold { .. })
    ));
    assert!(!r.user_message().contains("not satisfied"));

    let decision = arb.decide_escalation(
        &r,
        "q",
        &candidates,
        EscalationState::new(EscalationTier::Basic),
    );
    assert!(decision.escalate);
    assert_eq!(decision.next_tier, Some(EscalationTier::Advanced));
    let ctx = decision.context.unwrap();
    assert!(ctx.failure_analysis.contains("not satisfied"));
}

#[tokio::test]
async fn test_all_failed_at_expert_with_budget_spent_is_terminal() {
    let candidates = strings(&["SELECT p"]);
    let tests = checks(2);
    let judge = ScriptedJudge::new(&[("SELECT p", "FF")]);
    let arb = arbiter(config(), Arc::new(TierProducer::default()), tests.clone(), Arc::new(judge));

    let r = arb
        .evaluate_and_select(input(&candidates, &tests), &CancellationToken::new())
        .await
        .unwrap()
        .result;
    let decision = arb.decide_escalation(
        &r,
        "q",
        &candidates,
        EscalationState {
            tier: EscalationTier::Expert,
            attempts_used: 2,
        },
    );
    assert!(!decision.escalate);
    assert!(decision.context.is_none());
    assert!(decision
        .user_message
        .unwrap()
        .contains("quality threshold"));
}

#[tokio::test]
async fn test_judge_receives_deduplicated_tests_in_order() {
    let candidates = strings(&["SELECT 1"]);
    let tests = strings(&[
        "email must be valid",
        "Email Must Be Valid!",
        "[EVIDENCE-CRITICAL] email must be valid",
        "rows are ordered by date",
    ]);

    let mut judge = MockRemoteJudge::new();
    judge
        .expect_judge()
        .withf(|_, tests: &[String]| {
            tests
                == [
                    "[EVIDENCE-CRITICAL] email must be valid".to_string(),
                    "rows are ordered by date".to_string(),
                ]
        })
        .times(1)
        .returning(|_, _| Ok("SQL #1: OK, OK".to_string()));
    let arb = arbiter(config(), Arc::new(TierProducer::default()), tests.clone(), Arc::new(judge));

    let eval = arb
        .evaluate_and_select(input(&candidates, &tests), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(eval.dedup.duplicates_collapsed, 2);
    assert!(eval.result.success);
}

#[tokio::test]
async fn test_failing_judge_never_yields_a_pass() {
    let candidates = strings(&["SELECT 1", "SELECT 2"]);
    let tests = checks(3);
    let mut judge = MockRemoteJudge::new();
    judge
        .expect_judge()
        .returning(|_, _| Err(anyhow::anyhow!("connection reset")));
    let arb = arbiter(config(), Arc::new(TierProducer::default()), tests.clone(), Arc::new(judge));

    let r = arb
        .evaluate_and_select(input(&candidates, &tests), &CancellationToken::new())
        .await
        .unwrap()
        .result;
    assert!(!r.success);
    assert_eq!(r.case, Some(OutcomeCase::D));
    assert_eq!(r.metrics.pass_rates[&0].passed, 0);
}

struct PickLast;

#[async_trait]
impl Advisor for PickLast {
    async fn advise(&self, brief: &AdvisorBrief) -> anyhow::Result<AdvisorChoice> {
        Ok(AdvisorChoice {
            index: *brief.finalists.last().unwrap(),
            justification: "handles NULL names".to_string(),
        })
    }
}

struct PickOutsider;

#[async_trait]
impl Advisor for PickOutsider {
    async fn advise(&self, _brief: &AdvisorBrief) -> anyhow::Result<AdvisorChoice> {
        Ok(AdvisorChoice {
            index: 99,
            justification: "n/a".to_string(),
        })
    }
}

#[tokio::test]
async fn test_enhanced_consultation_picks_finalist() {
    let simple = "SELECT name FROM customers";
    let complex = "SELECT c.name FROM customers c JOIN orders o ON o.cid = c.id";
    let candidates = strings(&[simple, complex]);
    let tests = checks(4);
    let judge = ScriptedJudge::new(&[(simple, "PPPP"), (complex, "PPPP")]);
    let arb = arbiter(config(), Arc::new(TierProducer::default()), tests.clone(), Arc::new(judge))
        .with_advisor(Arc::new(PickLast));

    let mut inp = input(&candidates, &tests);
    inp.enhanced_enabled = true;
    let r = arb
        .evaluate_and_select(inp, &CancellationToken::new())
        .await
        .unwrap()
        .result;
    assert_eq!(r.method, SelectionMethod::Advisor);
    assert_eq!(r.selected.unwrap().index, 1);
    assert_eq!(r.advisor_justification.as_deref(), Some("handles NULL names"));
}

#[tokio::test]
async fn test_invalid_advisor_falls_back_to_tie_break() {
    let simple = "SELECT name FROM customers";
    let complex = "SELECT c.name FROM customers c JOIN orders o ON o.cid = c.id";
    let candidates = strings(&[complex, simple]);
    let tests = checks(4);
    let judge = ScriptedJudge::new(&[(simple, "PPPP"), (complex, "PPPP")]);
    let arb = arbiter(config(), Arc::new(TierProducer::default()), tests.clone(), Arc::new(judge))
        .with_advisor(Arc::new(PickOutsider));

    let mut inp = input(&candidates, &tests);
    inp.enhanced_enabled = true;
    let r = arb
        .evaluate_and_select(inp, &CancellationToken::new())
        .await
        .unwrap()
        .result;
    assert!(r.success);
    assert_eq!(r.method, SelectionMethod::Complexity);
    assert_eq!(r.selected.unwrap().index, 1);
}
