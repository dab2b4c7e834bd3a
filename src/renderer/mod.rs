//! Renderer composition and the built-in renderers.
//!
//! Every surface implements [`ui_renderer::Renderer`]. The closed set shipped
//! here is [`Bridge`] (secondary transport), [`HeadlessWindow`] (primary
//! stand-in when no native webview is linked) and [`MultiRenderer`] (fan-out
//! over a [`RendererSet`], nestable).

pub mod bridge;
pub mod headless;
pub mod multi;

use std::fmt;
use std::sync::Arc;

use ui_renderer::Renderer;

pub use bridge::{Bridge, BridgeClient, BridgeFrame};
pub use headless::HeadlessWindow;
pub use multi::{MultiRenderer, RunFailure};

/// Ordered renderers with a distinct primary slot.
///
/// The primary owns the calling thread during `run` and is always visited
/// last. Secondaries run on their own threads in declaration order.
#[derive(Clone)]
pub struct RendererSet {
    secondaries: Vec<Arc<dyn Renderer>>,
    primary: Arc<dyn Renderer>,
}

impl RendererSet {
    #[must_use]
    pub fn new(primary: Arc<dyn Renderer>) -> Self {
        Self {
            secondaries: Vec::new(),
            primary,
        }
    }

    /// Builds a set from a list whose last element is the primary.
    ///
    /// Returns `None` for an empty list.
    #[must_use]
    pub fn from_ordered(mut renderers: Vec<Arc<dyn Renderer>>) -> Option<Self> {
        let primary = renderers.pop()?;
        Some(Self {
            secondaries: renderers,
            primary,
        })
    }

    #[must_use]
    pub fn with_secondary(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.secondaries.push(renderer);
        self
    }

    pub fn push_secondary(&mut self, renderer: Arc<dyn Renderer>) {
        self.secondaries.push(renderer);
    }

    pub fn set_primary(&mut self, renderer: Arc<dyn Renderer>) {
        self.primary = renderer;
    }

    #[must_use]
    pub fn primary(&self) -> &Arc<dyn Renderer> {
        &self.primary
    }

    #[must_use]
    pub fn secondaries(&self) -> &[Arc<dyn Renderer>] {
        &self.secondaries
    }

    /// Secondaries in order, then the primary.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Renderer>> {
        self.secondaries
            .iter()
            .chain(std::iter::once(&self.primary))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.secondaries.len() + 1
    }

    /// Always `false`: a set cannot exist without its primary.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.iter().map(|renderer| renderer.name().to_string()).collect()
    }
}

impl fmt::Debug for RendererSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendererSet")
            .field(
                "secondaries",
                &self
                    .secondaries
                    .iter()
                    .map(|renderer| renderer.name())
                    .collect::<Vec<_>>(),
            )
            .field("primary", &self.primary.name())
            .finish()
    }
}
