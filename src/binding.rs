use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use log::{debug, warn};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use uuid::Uuid;

use crate::dataset::Dataset;
use crate::error::RidershipError;
use crate::filter::{FilterRequest, FilterSpec};
use crate::notes::NotesTable;
use crate::selection::{select, Selection};
use crate::views::{compute_view, ViewBundle, ViewName};

/// Node of the recomputation graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewNode {
    Filter,
    Selection,
    View(ViewName),
}

impl fmt::Display for ViewNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filter => f.write_str("filter"),
            Self::Selection => f.write_str("selection"),
            Self::View(name) => write!(f, "{name}"),
        }
    }
}

/// Dependency graph from the filter to every published view.
///
/// Edges point downstream. Evaluation walks a topological order, so the
/// selection is always rebuilt before any view that reads it.
pub struct ViewGraph {
    graph: DiGraph<ViewNode, ()>,
    /// Map from view name → NodeIndex for fast lookup.
    node_map: BTreeMap<ViewName, NodeIndex>,
}

impl ViewGraph {
    pub fn new() -> Self {
        let mut graph = DiGraph::new();
        let filter = graph.add_node(ViewNode::Filter);
        let selection = graph.add_node(ViewNode::Selection);
        graph.add_edge(filter, selection, ());

        let mut node_map = BTreeMap::new();
        for name in ViewName::ALL {
            let idx = graph.add_node(ViewNode::View(name));
            let upstream = if name.needs_selection() {
                selection
            } else {
                filter
            };
            graph.add_edge(upstream, idx, ());
            node_map.insert(name, idx);
        }

        Self { graph, node_map }
    }

    /// Direct inputs of a view.
    pub fn dependencies(&self, name: ViewName) -> Vec<ViewNode> {
        let Some(&idx) = self.node_map.get(&name) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(idx, Direction::Incoming)
            .map(|n| self.graph[n])
            .collect()
    }

    /// Recompute the selection and every view for `spec`.
    pub fn evaluate(
        &self,
        dataset: &Dataset,
        notes: &NotesTable,
        spec: &FilterSpec,
    ) -> Result<ViewBundle, RidershipError> {
        let order = toposort(&self.graph, None).map_err(|cycle| {
            RidershipError::InvalidData(format!(
                "View graph has a cycle through '{}'",
                self.graph[cycle.node_id()]
            ))
        })?;

        let mut selection: Option<Selection> = None;
        let mut views = BTreeMap::new();
        for idx in order {
            match self.graph[idx] {
                ViewNode::Filter => {}
                ViewNode::Selection => selection = Some(select(dataset, spec)?),
                ViewNode::View(name) => {
                    let value = compute_view(name, selection.as_ref(), notes, spec)?;
                    views.insert(name, value);
                }
            }
        }

        debug!(
            "Recomputed {} views over {} selected rows",
            views.len(),
            selection.as_ref().map_or(0, Selection::len)
        );
        Ok(ViewBundle::new(spec.clone(), views))
    }
}

impl Default for ViewGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by [`ViewBinding::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

type Subscriber = Box<dyn FnMut(&ViewBundle)>;

/// One dashboard session: the current filter, its views, and the
/// presentation callbacks to notify when they change.
///
/// The dataset and notes are shared read-only; every session owns its own
/// binding.
pub struct ViewBinding {
    dataset: Arc<Dataset>,
    notes: Arc<NotesTable>,
    graph: ViewGraph,
    current: ViewBundle,
    subscribers: Vec<(SubscriberId, Subscriber)>,
}

impl ViewBinding {
    /// Build a binding and compute the views for `initial`.
    pub fn new(
        dataset: Arc<Dataset>,
        notes: Arc<NotesTable>,
        initial: FilterSpec,
    ) -> Result<Self, RidershipError> {
        let graph = ViewGraph::new();
        let current = graph.evaluate(&dataset, &notes, &initial)?;
        Ok(Self {
            dataset,
            notes,
            graph,
            current,
            subscribers: Vec::new(),
        })
    }

    /// Start from [`FilterSpec::initial`].
    pub fn with_default_filter(
        dataset: Arc<Dataset>,
        notes: Arc<NotesTable>,
        window_years: u32,
    ) -> Result<Self, RidershipError> {
        let initial = FilterSpec::initial(&dataset, window_years);
        Self::new(dataset, notes, initial)
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriberId
    where
        F: FnMut(&ViewBundle) + 'static,
    {
        let id = SubscriberId(Uuid::new_v4());
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    /// The single update entry point.
    ///
    /// Validates `request`, recomputes the selection and every view, then
    /// notifies subscribers in registration order. A rejected request leaves
    /// the current filter and views untouched and notifies nobody.
    pub fn on_filter_change(
        &mut self,
        request: FilterRequest,
    ) -> Result<&ViewBundle, RidershipError> {
        let bundle = self.recompute(request)?;
        Ok(self.publish(bundle))
    }

    /// Views `request` would produce, without making them current.
    pub fn recompute(&self, request: FilterRequest) -> Result<ViewBundle, RidershipError> {
        let spec = request.validate(&self.dataset).inspect_err(|err| {
            warn!("Rejected filter update: {err}");
        })?;
        self.graph.evaluate(&self.dataset, &self.notes, &spec)
    }

    /// Make `bundle` current and notify subscribers.
    pub(crate) fn publish(&mut self, bundle: ViewBundle) -> &ViewBundle {
        self.current = bundle;
        for (_, subscriber) in self.subscribers.iter_mut() {
            subscriber(&self.current);
        }
        &self.current
    }

    pub fn current_filter(&self) -> &FilterSpec {
        self.current.filter()
    }

    pub fn current_views(&self) -> &ViewBundle {
        &self.current
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }
}
