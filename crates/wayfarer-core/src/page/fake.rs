//! In-memory page implementation for development and testing.
//!
//! `FakePage` models a document as a selector-keyed element registry with
//! recorded navigations, clicks and synthesized events. Selectors are
//! matched by exact string, and scoped queries only see children
//! registered under their parent.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use super::{ElementHandle, PageContext, PageError};

/// Element description used when building a [`FakePage`].
#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    text: String,
    html: String,
    value: Option<String>,
    attributes: HashMap<String, String>,
    interactive: bool,
}

impl FakeElement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a text input.
    pub fn input() -> Self {
        Self {
            value: Some(String::new()),
            interactive: true,
            ..Self::default()
        }
    }

    /// Shorthand for a clickable control.
    pub fn button(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            interactive: true,
            ..Self::default()
        }
    }

    /// Shorthand for a link with an href.
    pub fn link(text: impl Into<String>, href: impl Into<String>) -> Self {
        let mut attributes = HashMap::new();
        attributes.insert("href".to_string(), href.into());
        Self {
            text: text.into(),
            attributes,
            interactive: true,
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = html.into();
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }
}

#[derive(Debug)]
struct ElementData {
    label: String,
    element: FakeElement,
}

#[derive(Debug, Default)]
struct Inner {
    url: String,
    elements: Vec<ElementData>,
    by_selector: HashMap<String, Vec<u64>>,
    children: HashMap<(u64, String), Vec<u64>>,
    poisoned: HashMap<String, String>,
    navigations: Vec<String>,
    clicks: Vec<String>,
    events: Vec<(String, String)>,
}

/// In-memory [`PageContext`] implementation.
pub struct FakePage {
    inner: RwLock<Inner>,
    load_delay: Duration,
}

impl FakePage {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                url: url.into(),
                ..Inner::default()
            }),
            load_delay: Duration::ZERO,
        }
    }

    /// Make [`PageContext::wait_for_load`] take this long, to exercise
    /// navigation timeout handling.
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    fn inner_mut(&mut self) -> &mut Inner {
        self.inner
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a top-level element under a selector. Returns its handle.
    pub fn add_element(&mut self, selector: impl Into<String>, element: FakeElement) -> ElementHandle {
        let selector = selector.into();
        let inner = self.inner_mut();
        let id = inner.elements.len() as u64;
        inner.elements.push(ElementData {
            label: selector.clone(),
            element,
        });
        inner.by_selector.entry(selector).or_default().push(id);
        ElementHandle::new(id)
    }

    /// Register an element only visible through scoped queries on `parent`.
    pub fn add_child(
        &mut self,
        parent: &ElementHandle,
        selector: impl Into<String>,
        element: FakeElement,
    ) -> ElementHandle {
        let selector = selector.into();
        let inner = self.inner_mut();
        let id = inner.elements.len() as u64;
        inner.elements.push(ElementData {
            label: selector.clone(),
            element,
        });
        inner
            .children
            .entry((parent.raw(), selector))
            .or_default()
            .push(id);
        ElementHandle::new(id)
    }

    /// Make any query against `selector` fail with a backend error.
    pub fn poison_selector(&mut self, selector: impl Into<String>, message: impl Into<String>) {
        self.inner_mut()
            .poisoned
            .insert(selector.into(), message.into());
    }

    /// All URLs passed to `navigate`, in order.
    pub fn navigations(&self) -> Vec<String> {
        self.read().map(|i| i.navigations.clone()).unwrap_or_default()
    }

    /// Labels of clicked elements, in order.
    pub fn clicks(&self) -> Vec<String> {
        self.read().map(|i| i.clicks.clone()).unwrap_or_default()
    }

    /// Synthesized events as (element label, event name), in order.
    pub fn events(&self) -> Vec<(String, String)> {
        self.read().map(|i| i.events.clone()).unwrap_or_default()
    }

    /// Current value of an input element.
    pub fn value_of(&self, element: &ElementHandle) -> Option<String> {
        self.read()
            .ok()
            .and_then(|i| i.elements.get(element.raw() as usize)?.element.value.clone())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, PageError> {
        self.inner
            .read()
            .map_err(|e| PageError::Backend(e.to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, PageError> {
        self.inner
            .write()
            .map_err(|e| PageError::Backend(e.to_string()))
    }
}

impl Inner {
    fn check_poisoned(&self, selector: &str) -> Result<(), PageError> {
        if let Some(message) = self.poisoned.get(selector) {
            return Err(PageError::Backend(message.clone()));
        }
        Ok(())
    }

    fn data(&self, element: &ElementHandle) -> Result<&ElementData, PageError> {
        self.elements
            .get(element.raw() as usize)
            .ok_or_else(|| PageError::Detached(format!("element #{}", element.raw())))
    }

    fn data_mut(&mut self, element: &ElementHandle) -> Result<&mut ElementData, PageError> {
        let raw = element.raw();
        self.elements
            .get_mut(raw as usize)
            .ok_or_else(|| PageError::Detached(format!("element #{raw}")))
    }
}

#[async_trait]
impl PageContext for FakePage {
    async fn navigate(&self, url: &str) -> Result<(), PageError> {
        let mut inner = self.write()?;
        inner.navigations.push(url.to_string());
        inner.url = url.to_string();
        Ok(())
    }

    async fn wait_for_load(&self) -> Result<(), PageError> {
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        Ok(())
    }

    fn current_url(&self) -> String {
        self.read().map(|i| i.url.clone()).unwrap_or_default()
    }

    async fn query(&self, selector: &str) -> Result<Option<ElementHandle>, PageError> {
        let inner = self.read()?;
        inner.check_poisoned(selector)?;
        Ok(inner
            .by_selector
            .get(selector)
            .and_then(|ids| ids.first())
            .map(|id| ElementHandle::new(*id)))
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>, PageError> {
        let inner = self.read()?;
        inner.check_poisoned(selector)?;
        Ok(inner
            .by_selector
            .get(selector)
            .map(|ids| ids.iter().map(|id| ElementHandle::new(*id)).collect())
            .unwrap_or_default())
    }

    async fn query_within(
        &self,
        parent: &ElementHandle,
        selector: &str,
    ) -> Result<Option<ElementHandle>, PageError> {
        let inner = self.read()?;
        inner.check_poisoned(selector)?;
        Ok(inner
            .children
            .get(&(parent.raw(), selector.to_string()))
            .and_then(|ids| ids.first())
            .map(|id| ElementHandle::new(*id)))
    }

    async fn query_all_within(
        &self,
        parent: &ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, PageError> {
        let inner = self.read()?;
        inner.check_poisoned(selector)?;
        Ok(inner
            .children
            .get(&(parent.raw(), selector.to_string()))
            .map(|ids| ids.iter().map(|id| ElementHandle::new(*id)).collect())
            .unwrap_or_default())
    }

    async fn find_by_text(&self, text: &str) -> Result<Option<ElementHandle>, PageError> {
        let inner = self.read()?;
        Ok(inner
            .elements
            .iter()
            .enumerate()
            .find(|(_, data)| data.element.interactive && data.element.text.contains(text))
            .map(|(id, _)| ElementHandle::new(id as u64)))
    }

    async fn text(&self, element: &ElementHandle) -> Result<String, PageError> {
        Ok(self.read()?.data(element)?.element.text.clone())
    }

    async fn outer_html(&self, element: &ElementHandle) -> Result<String, PageError> {
        let inner = self.read()?;
        let data = inner.data(element)?;
        if data.element.html.is_empty() {
            Ok(format!("<div>{}</div>", data.element.text))
        } else {
            Ok(data.element.html.clone())
        }
    }

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, PageError> {
        Ok(self.read()?.data(element)?.element.attributes.get(name).cloned())
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), PageError> {
        let mut inner = self.write()?;
        let label = inner.data(element)?.label.clone();
        inner.clicks.push(label);
        Ok(())
    }

    async fn set_value(&self, element: &ElementHandle, value: &str) -> Result<(), PageError> {
        let mut inner = self.write()?;
        inner.data_mut(element)?.element.value = Some(value.to_string());
        Ok(())
    }

    async fn dispatch_event(&self, element: &ElementHandle, event: &str) -> Result<(), PageError> {
        let mut inner = self.write()?;
        let label = inner.data(element)?.label.clone();
        inner.events.push((label, event.to_string()));
        Ok(())
    }

    async fn scroll_into_view(&self, element: &ElementHandle) -> Result<(), PageError> {
        self.read()?.data(element)?;
        Ok(())
    }
}
