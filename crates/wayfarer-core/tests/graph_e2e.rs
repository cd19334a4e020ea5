//! End-to-end run of a small search-and-scrape graph against a fake page.

use std::sync::Arc;

use serde_json::json;

use wayfarer_core::interpreter::InterpreterConfig;
use wayfarer_core::page::{FakeElement, FakePage, PageContext};
use wayfarer_core::retry::RetryPolicy;
use wayfarer_core::scheduler::{GraphRunner, StepDriver, StepExecutor};
use wayfarer_core::types::{ActionKind, Step, StepId, StepStatus, TaskGraph};

#[test]
fn type_click_scrape_pipeline_completes() {
    tokio_test::block_on(async {
        let mut page = FakePage::new("https://careers.example.com/");
        let query_input = page.add_element("#q", FakeElement::input());
        page.add_element("#search", FakeElement::button("Search"));
        page.add_element(
            ".results .job",
            FakeElement::new().with_text("Rust Engineer - Acme"),
        );

        let page = Arc::new(page);
        let driver = StepDriver::with_interpreter_config(
            Arc::clone(&page) as Arc<dyn PageContext>,
            InterpreterConfig::immediate(),
        )
        .with_retry_policy(RetryPolicy::immediate());

        let graph = TaskGraph::from_nodes(vec![
            Step::new("s1", "type query", ActionKind::Type)
                .with_payload(json!({"selector": "#q", "text": "rust engineer"})),
            Step::new("s2", "click search", ActionKind::Click)
                .with_payload(json!({"selector": "#search"}))
                .with_dependencies(vec![StepId::from("s1")]),
            Step::new("s3", "scrape results", ActionKind::Scrape)
                .with_payload(json!({"selector": ".results .job"}))
                .with_dependencies(vec![StepId::from("s2")]),
        ]);

        let runner = GraphRunner::new(Arc::new(driver) as Arc<dyn StepExecutor>);
        let report = runner.run("task-e2e", &graph).await.expect("valid graph");

        assert!(report.success());
        for id in ["s1", "s2", "s3"] {
            assert_eq!(
                report.status_of(&StepId::from(id)),
                Some(StepStatus::Completed),
                "step {id} should complete"
            );
        }

        // The typed value landed in the input and the button was clicked.
        assert_eq!(page.value_of(&query_input).as_deref(), Some("rust engineer"));
        assert_eq!(page.clicks(), vec!["#search"]);

        // Scrape saw exactly one result card.
        let scrape = report.outcome_of(&StepId::from("s3")).expect("s3 ran");
        let data = scrape.data.as_ref().expect("scrape data");
        assert_eq!(data["total"], 1);
        assert!(data["items"][0]["text"]
            .as_str()
            .unwrap()
            .contains("Rust Engineer"));
    });
}
