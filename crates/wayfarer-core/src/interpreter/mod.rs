//! Step interpreter
//!
//! Executes one typed action against a live [`PageContext`]. A single call
//! is a single attempt: retries live in [`crate::retry`], scheduling in
//! [`crate::scheduler`]. Failures are captured into the returned outcome
//! and never unwind past this boundary.

mod payload;
mod sites;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::StepError;
use crate::page::{ElementHandle, PageContext, PageError};
use crate::types::{ActionKind, Step, StepOutcome};

pub use payload::{
    ApplyPayload, ClickPayload, ExtractPayload, LoopPayload, NavigatePayload, ParsePayload,
    ScrapePayload, SearchPayload, SubmitPayload, TypePayload, VerifyPayload, WaitPayload,
};

/// Poll cadence for bounded selector waits.
const WAIT_POLL: Duration = Duration::from_millis(100);

/// Tunable delays and caps for the interpreter.
#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    /// Pause after a click, modeling human-perceptible page reaction time.
    pub click_settle: Duration,
    /// Pause after typing into an input.
    pub type_settle: Duration,
    /// Upper bound on the page-load wait after navigation.
    pub navigate_timeout: Duration,
    /// Cap on postings returned by the generic parse fallback.
    pub parse_cap: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            click_settle: Duration::from_millis(800),
            type_settle: Duration::from_millis(400),
            navigate_timeout: Duration::from_secs(5),
            parse_cap: 20,
        }
    }
}

impl InterpreterConfig {
    /// No settle delays. For tests and dry runs; the navigation bound stays.
    pub fn immediate() -> Self {
        Self {
            click_settle: Duration::ZERO,
            type_settle: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Executes single steps against one page.
pub struct StepInterpreter {
    page: Arc<dyn PageContext>,
    config: InterpreterConfig,
}

impl StepInterpreter {
    pub fn new(page: Arc<dyn PageContext>) -> Self {
        Self {
            page,
            config: InterpreterConfig::default(),
        }
    }

    pub fn with_config(page: Arc<dyn PageContext>, config: InterpreterConfig) -> Self {
        Self { page, config }
    }

    /// Execute one attempt of `step`. Never panics on bad input; defects
    /// come back as failed outcomes.
    ///
    /// Returns an explicitly boxed `Send` future so the recursive `Loop`
    /// substep path (which re-enters `execute` through `run_loop_item`) can
    /// be proven `Send` without the compiler chasing an inference cycle.
    pub fn execute<'a>(
        &'a self,
        task_id: &'a str,
        step: &'a Step,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = StepOutcome> + Send + 'a>> {
        Box::pin(async move {
            tracing::debug!(
                task_id = %task_id,
                step_id = %step.id,
                action = %step.action,
                "executing step"
            );

            match self.dispatch(task_id, step).await {
                Ok(Some(data)) => StepOutcome::ok_with(data),
                Ok(None) => StepOutcome::ok(),
                Err(e) => {
                    tracing::debug!(
                        task_id = %task_id,
                        step_id = %step.id,
                        action = %step.action,
                        error = %e,
                        "step attempt failed"
                    );
                    StepOutcome::fail(e.to_string())
                }
            }
        })
    }

    async fn dispatch(&self, task_id: &str, step: &Step) -> Result<Option<Value>, StepError> {
        match step.action {
            ActionKind::Navigate => self.run_navigate(step).await,
            ActionKind::Click => self.run_click(step).await,
            ActionKind::Type => self.run_type(step).await,
            ActionKind::Extract => self.run_extract(step).await,
            ActionKind::Wait => self.run_wait(step).await,
            ActionKind::Search => self.run_search(step).await,
            ActionKind::Scrape => self.run_scrape(step).await,
            ActionKind::Parse => self.run_parse(step).await,
            ActionKind::Loop => self.run_loop(task_id, step).await,
            ActionKind::Verify => self.run_verify(step).await,
            ActionKind::Submit => self.run_submit(step).await,
            ActionKind::Apply => self.run_apply(step).await,
        }
    }

    async fn run_navigate(&self, step: &Step) -> Result<Option<Value>, StepError> {
        let p: NavigatePayload = payload::parse(ActionKind::Navigate, &step.payload)?;
        let timeout = p
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.config.navigate_timeout);
        self.goto(&p.url, timeout).await?;
        Ok(Some(json!({
            "url": p.url,
            "final_url": self.page.current_url(),
        })))
    }

    /// Navigate and race the load wait against a timer. Losing the race is
    /// not fatal: the page may still be usable, so we log and continue.
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), StepError> {
        self.page.navigate(url).await?;
        match tokio::time::timeout(timeout, self.page.wait_for_load()).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(url = %url, ?timeout, "load event not observed in time; continuing");
            }
        }
        Ok(())
    }

    async fn run_click(&self, step: &Step) -> Result<Option<Value>, StepError> {
        let p: ClickPayload = payload::parse(ActionKind::Click, &step.payload)?;
        let (element, method) = self.resolve_clickable(&p).await?;
        self.page.click(&element).await?;
        self.settle(self.config.click_settle).await;
        Ok(Some(json!({ "method": method })))
    }

    /// CSS selector first, then text-content match among interactive
    /// elements.
    async fn resolve_clickable(
        &self,
        p: &ClickPayload,
    ) -> Result<(ElementHandle, &'static str), StepError> {
        if let Some(selector) = &p.selector {
            if let Some(element) = self.page.query(selector).await? {
                return Ok((element, "selector"));
            }
        }
        if let Some(text) = &p.text {
            if let Some(element) = self.page.find_by_text(text).await? {
                return Ok((element, "text"));
            }
        }
        match (&p.selector, &p.text) {
            (None, None) => Err(StepError::invalid_payload(
                "click",
                "requires 'selector' or 'text'",
            )),
            (selector, text) => Err(StepError::ElementNotFound(describe_target(
                selector.as_deref(),
                text.as_deref(),
            ))),
        }
    }

    async fn run_type(&self, step: &Step) -> Result<Option<Value>, StepError> {
        let p: TypePayload = payload::parse(ActionKind::Type, &step.payload)?;
        let element = self
            .page
            .query(&p.selector)
            .await?
            .ok_or_else(|| StepError::ElementNotFound(p.selector.clone()))?;

        // Direct value assignment does not wake framework-bound listeners;
        // synthesize the events they subscribe to.
        self.page.set_value(&element, &p.text).await?;
        self.page.dispatch_event(&element, "input").await?;
        self.page.dispatch_event(&element, "change").await?;
        self.settle(self.config.type_settle).await;

        Ok(Some(json!({
            "selector": p.selector,
            "chars": p.text.chars().count(),
        })))
    }

    async fn run_extract(&self, step: &Step) -> Result<Option<Value>, StepError> {
        let p: ExtractPayload = payload::parse(ActionKind::Extract, &step.payload)?;
        if p.multiple {
            let elements = self.page.query_all(&p.selector).await?;
            let mut values = Vec::with_capacity(elements.len());
            for element in &elements {
                values.push(self.read_field(element, p.attribute.as_deref()).await?);
            }
            let count = values.len();
            Ok(Some(json!({ "values": values, "count": count })))
        } else {
            let value = match self.page.query(&p.selector).await? {
                Some(element) => self.read_field(&element, p.attribute.as_deref()).await?,
                None => Value::Null,
            };
            Ok(Some(json!({ "value": value })))
        }
    }

    async fn read_field(
        &self,
        element: &ElementHandle,
        attribute: Option<&str>,
    ) -> Result<Value, StepError> {
        match attribute {
            None | Some("textContent") => Ok(Value::String(self.page.text(element).await?)),
            Some(name) => Ok(self
                .page
                .attribute(element, name)
                .await?
                .map(Value::String)
                .unwrap_or(Value::Null)),
        }
    }

    async fn run_wait(&self, step: &Step) -> Result<Option<Value>, StepError> {
        let p: WaitPayload = payload::parse(ActionKind::Wait, &step.payload)?;
        if let Some(selector) = &p.selector {
            let timeout = p
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(self.config.navigate_timeout);
            let deadline = tokio::time::Instant::now() + timeout;
            loop {
                if self.page.query(selector).await?.is_some() {
                    return Ok(Some(json!({ "found": selector })));
                }
                if tokio::time::Instant::now() >= deadline {
                    return Err(StepError::Timeout {
                        waited: timeout,
                        what: format!("selector '{selector}'"),
                    });
                }
                tokio::time::sleep(WAIT_POLL.min(timeout)).await;
            }
        } else if let Some(ms) = p.ms {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(Some(json!({ "waited_ms": ms })))
        } else {
            Err(StepError::invalid_payload(
                "wait",
                "requires 'ms' or 'selector'",
            ))
        }
    }

    /// Site-aware search with graceful degradation: known job board by
    /// direct URL, then a generic on-page search input, then a site-scoped
    /// external web search. The last rung always succeeds.
    async fn run_search(&self, step: &Step) -> Result<Option<Value>, StepError> {
        let p: SearchPayload = payload::parse(ActionKind::Search, &step.payload)?;
        let host = sites::host_of(&self.page.current_url());

        if let Some(board) = sites::KnownHost::from_host(&host) {
            let url = board.search_url(&p);
            self.goto(&url, self.config.navigate_timeout).await?;
            return Ok(Some(json!({ "method": "job_board", "url": url })));
        }

        for selector in sites::SEARCH_INPUT_SELECTORS {
            if let Some(element) = self.page.query(selector).await? {
                self.page.set_value(&element, &p.query).await?;
                self.page.dispatch_event(&element, "input").await?;
                self.page.dispatch_event(&element, "change").await?;
                self.page.dispatch_event(&element, "submit").await?;
                self.settle(self.config.type_settle).await;
                return Ok(Some(json!({ "method": "search_input", "selector": selector })));
            }
        }

        let url = sites::external_search_url(&host, &p.query);
        self.goto(&url, self.config.navigate_timeout).await?;
        Ok(Some(json!({ "method": "external", "url": url })))
    }

    async fn run_scrape(&self, step: &Step) -> Result<Option<Value>, StepError> {
        let p: ScrapePayload = payload::parse(ActionKind::Scrape, &step.payload)?;
        let elements = self.page.query_all(&p.selector).await?;
        let mut items = Vec::with_capacity(elements.len());
        for element in &elements {
            items.push(json!({
                "text": self.page.text(element).await?,
                "html": self.page.outer_html(element).await?,
            }));
        }
        let total = items.len();
        Ok(Some(json!({ "items": items, "total": total })))
    }

    async fn run_parse(&self, step: &Step) -> Result<Option<Value>, StepError> {
        let p: ParsePayload = payload::parse(ActionKind::Parse, &step.payload)?;
        let cap = p.limit.unwrap_or(self.config.parse_cap);
        let host = sites::host_of(&self.page.current_url());

        let jobs = match sites::KnownHost::from_host(&host) {
            Some(board) => self.parse_board(board, cap).await?,
            None => self.parse_generic(cap).await?,
        };

        let total = jobs.len();
        Ok(Some(json!({ "jobs": jobs, "total": total, "source": host })))
    }

    /// Structured extraction using the board's field mappings.
    async fn parse_board(
        &self,
        board: sites::KnownHost,
        cap: usize,
    ) -> Result<Vec<Value>, StepError> {
        let fields = board.parse_fields();
        let cards = self.page.query_all(fields.container).await?;
        let mut jobs = Vec::new();
        for card in cards.iter().take(cap) {
            let link = match self.page.query_within(card, fields.link).await? {
                Some(anchor) => self
                    .page
                    .attribute(&anchor, "href")
                    .await?
                    .map(Value::String)
                    .unwrap_or(Value::Null),
                None => Value::Null,
            };
            jobs.push(json!({
                "title": self.text_within(card, fields.title).await?,
                "company": self.text_within(card, fields.company).await?,
                "location": self.text_within(card, fields.location).await?,
                "link": link,
            }));
        }
        Ok(jobs)
    }

    /// Text of the first scoped match, or empty when absent.
    async fn text_within(
        &self,
        parent: &ElementHandle,
        selector: &str,
    ) -> Result<String, StepError> {
        match self.page.query_within(parent, selector).await? {
            Some(element) => Ok(self.page.text(&element).await?),
            None => Ok(String::new()),
        }
    }

    /// Fallback heuristic for unknown hosts: anchors that mention "job".
    async fn parse_generic(&self, cap: usize) -> Result<Vec<Value>, StepError> {
        let anchors = self.page.query_all("a").await?;
        let mut jobs = Vec::new();
        for anchor in &anchors {
            if jobs.len() >= cap {
                break;
            }
            let href = self.page.attribute(anchor, "href").await?.unwrap_or_default();
            let text = self.page.text(anchor).await?;
            if href.to_ascii_lowercase().contains("job")
                || text.to_ascii_lowercase().contains("job")
            {
                jobs.push(json!({ "title": text, "link": href }));
            }
        }
        Ok(jobs)
    }

    async fn run_loop(&self, task_id: &str, step: &Step) -> Result<Option<Value>, StepError> {
        let p: LoopPayload = payload::parse(ActionKind::Loop, &step.payload)?;
        let containers = self.page.query_all(&p.selector).await?;
        let take = p.limit.unwrap_or(containers.len());

        let mut results = Vec::new();
        for (index, container) in containers.iter().take(take).enumerate() {
            match self.run_loop_item(task_id, container, &p).await {
                Ok(()) => results.push(json!({ "index": index, "success": true })),
                Err(error) => {
                    // Per-item failures stay local; the loop carries on.
                    tracing::debug!(
                        task_id = %task_id,
                        step_id = %step.id,
                        index,
                        error = %error,
                        "loop item failed"
                    );
                    results.push(json!({ "index": index, "success": false, "error": error }));
                }
            }
        }

        let total = results.len();
        Ok(Some(json!({ "results": results, "total": total })))
    }

    async fn run_loop_item(
        &self,
        task_id: &str,
        container: &ElementHandle,
        p: &LoopPayload,
    ) -> Result<(), String> {
        if p.scroll {
            self.page
                .scroll_into_view(container)
                .await
                .map_err(|e| e.to_string())?;
        }
        if p.open {
            self.page.click(container).await.map_err(|e| e.to_string())?;
            self.settle(self.config.click_settle).await;
        }

        let scoped: Arc<dyn PageContext> = Arc::new(ScopedPage {
            inner: Arc::clone(&self.page),
            scope: container.clone(),
        });
        let interpreter = StepInterpreter::with_config(scoped, self.config.clone());

        for substep in &p.substeps {
            // Substeps may themselves contain loops; `execute` returns an
            // already-boxed future to break the recursive-`Send` cycle.
            let outcome = interpreter.execute(task_id, substep).await;
            if !outcome.is_success() {
                return Err(outcome
                    .error
                    .unwrap_or_else(|| format!("substep '{}' failed", substep.id)));
            }
        }
        Ok(())
    }

    async fn run_verify(&self, step: &Step) -> Result<Option<Value>, StepError> {
        let p: VerifyPayload = payload::parse(ActionKind::Verify, &step.payload)?;
        let element = self
            .page
            .query(&p.selector)
            .await?
            .ok_or_else(|| StepError::ElementNotFound(p.selector.clone()))?;
        let text = self.page.text(&element).await?;
        if let Some(needle) = &p.contains {
            if !text.contains(needle.as_str()) {
                return Err(StepError::VerificationFailed(format!(
                    "'{}' text does not contain '{}'",
                    p.selector, needle
                )));
            }
        }
        Ok(Some(json!({ "verified": true, "text": text })))
    }

    async fn run_submit(&self, step: &Step) -> Result<Option<Value>, StepError> {
        let p: SubmitPayload = payload::parse(ActionKind::Submit, &step.payload)?;
        let defaults = ["button[type='submit']", "input[type='submit']", "[type='submit']"];
        let candidates: Vec<&str> = match &p.selector {
            Some(selector) => vec![selector.as_str()],
            None => defaults.to_vec(),
        };

        for selector in &candidates {
            if let Some(element) = self.page.query(selector).await? {
                self.page.click(&element).await?;
                self.settle(self.config.click_settle).await;
                return Ok(Some(json!({ "clicked": selector })));
            }
        }
        Err(StepError::ElementNotFound(candidates.join(", ")))
    }

    /// Host-specific only: unknown hosts fail explicitly rather than
    /// guessing at an apply flow.
    async fn run_apply(&self, step: &Step) -> Result<Option<Value>, StepError> {
        let _p: ApplyPayload = payload::parse(ActionKind::Apply, &step.payload)?;
        let host = sites::host_of(&self.page.current_url());
        let board = sites::KnownHost::from_host(&host).ok_or_else(|| {
            StepError::UnsupportedAction(format!("apply is not supported on '{host}'"))
        })?;

        let selector = board.apply_selector();
        let element = self
            .page
            .query(selector)
            .await?
            .ok_or_else(|| StepError::ElementNotFound(selector.to_string()))?;
        self.page.click(&element).await?;
        self.settle(self.config.click_settle).await;
        Ok(Some(json!({ "host": host, "clicked": selector })))
    }

    async fn settle(&self, delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

fn describe_target(selector: Option<&str>, text: Option<&str>) -> String {
    match (selector, text) {
        (Some(s), Some(t)) => format!("{s} (or text '{t}')"),
        (Some(s), None) => s.to_string(),
        (None, Some(t)) => format!("text '{t}'"),
        (None, None) => "no target".to_string(),
    }
}

/// Page view scoped to one container element.
///
/// Only selectors starting with the literal `$this` token are rewritten to
/// container-scoped queries; everything else passes through unscoped.
struct ScopedPage {
    inner: Arc<dyn PageContext>,
    scope: ElementHandle,
}

impl ScopedPage {
    fn rewrite<'a>(&self, selector: &'a str) -> Option<&'a str> {
        selector.strip_prefix("$this").map(str::trim_start)
    }
}

#[async_trait]
impl PageContext for ScopedPage {
    async fn navigate(&self, url: &str) -> Result<(), PageError> {
        self.inner.navigate(url).await
    }

    async fn wait_for_load(&self) -> Result<(), PageError> {
        self.inner.wait_for_load().await
    }

    fn current_url(&self) -> String {
        self.inner.current_url()
    }

    async fn query(&self, selector: &str) -> Result<Option<ElementHandle>, PageError> {
        match self.rewrite(selector) {
            Some(rest) => self.inner.query_within(&self.scope, rest).await,
            None => self.inner.query(selector).await,
        }
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>, PageError> {
        match self.rewrite(selector) {
            Some(rest) => self.inner.query_all_within(&self.scope, rest).await,
            None => self.inner.query_all(selector).await,
        }
    }

    async fn query_within(
        &self,
        parent: &ElementHandle,
        selector: &str,
    ) -> Result<Option<ElementHandle>, PageError> {
        self.inner.query_within(parent, selector).await
    }

    async fn query_all_within(
        &self,
        parent: &ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, PageError> {
        self.inner.query_all_within(parent, selector).await
    }

    async fn find_by_text(&self, text: &str) -> Result<Option<ElementHandle>, PageError> {
        self.inner.find_by_text(text).await
    }

    async fn text(&self, element: &ElementHandle) -> Result<String, PageError> {
        self.inner.text(element).await
    }

    async fn outer_html(&self, element: &ElementHandle) -> Result<String, PageError> {
        self.inner.outer_html(element).await
    }

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, PageError> {
        self.inner.attribute(element, name).await
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), PageError> {
        self.inner.click(element).await
    }

    async fn set_value(&self, element: &ElementHandle, value: &str) -> Result<(), PageError> {
        self.inner.set_value(element, value).await
    }

    async fn dispatch_event(&self, element: &ElementHandle, event: &str) -> Result<(), PageError> {
        self.inner.dispatch_event(element, event).await
    }

    async fn scroll_into_view(&self, element: &ElementHandle) -> Result<(), PageError> {
        self.inner.scroll_into_view(element).await
    }
}
