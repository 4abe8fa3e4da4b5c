//! End-to-end anchoring flow: creation, deletion, listing, and the idempotent
//! reconcile pass that re-anchors persisted records onto a live document.
//!
//! The host's event sources (page lifecycle, storage change notifications,
//! mutation observation) all funnel into [`Orchestrator::handle_event`], which
//! lands in the same reconcile logic. Reconciliation is safe to re-run at any
//! moment: a record whose span is already live is skipped, so overlapping
//! triggers never double-wrap.

use crate::anchor;
use crate::dom::Document;
use crate::highlight::{self, MaterializeError, SelectionRange};
use crate::locate::{self, TextMatch};
use crate::record::{self, HighlightRecord};
use crate::store::{HighlightStore, StoreError};
use ego_tree::NodeId;
use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;
use url::Url;

/// Anchoring state of one persisted record on the current document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorState {
    /// Known but not yet attempted on this document.
    Pending,
    /// A live span with the record's id exists.
    Anchored,
    /// Every relocation strategy failed; the record stays persisted and is
    /// retried on the next trigger.
    Lost,
    /// Removed by the user; kept only so late events ignore the id.
    Deleted,
}

/// Inbound trigger from the host environment.
///
/// All variants are answered with (a subset of) the reconcile pass, so any
/// interleaving of overlapping events is harmless.
#[derive(Debug, Clone)]
pub enum Event {
    /// The document finished (re)loading.
    DocumentLoaded,
    /// The page became visible again.
    VisibilityRegained,
    /// The window regained focus.
    FocusRegained,
    /// The persisted store changed under some key.
    StorageChanged {
        /// Document key the write touched.
        key: String,
    },
    /// Subtrees were added to the live document.
    SubtreeMutated {
        /// Roots of the added subtrees, each scanned for unanchored text.
        roots: Vec<NodeId>,
    },
}

/// Errors surfaced to the user-action boundary.
///
/// Locate failures and descriptor-resolution failures are deliberately *not*
/// here: the former transitions the record to [`AnchorState::Lost`], the
/// latter silently falls through to text search.
#[derive(Debug)]
pub enum HighlightError {
    /// Create was invoked with an empty or blank selection.
    EmptySelection,
    /// The persisted store failed; the operation was aborted with no partial
    /// write committed.
    Store(StoreError),
    /// DOM surgery failed; no partial wrap is left behind.
    Materialize(MaterializeError),
}

impl fmt::Display for HighlightError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptySelection => write!(f, "selection is empty or blank"),
            Self::Store(err) => write!(f, "persisted store failed: {err}"),
            Self::Materialize(err) => write!(f, "could not materialize highlight: {err}"),
        }
    }
}

impl std::error::Error for HighlightError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::EmptySelection => None,
            Self::Store(err) => Some(err),
            Self::Materialize(err) => Some(err),
        }
    }
}

impl From<StoreError> for HighlightError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<MaterializeError> for HighlightError {
    fn from(err: MaterializeError) -> Self {
        Self::Materialize(err)
    }
}

/// A highlight currently materialized on the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveHighlight {
    /// Record id carried by the live span.
    pub id: String,
    /// Rendered text inside the span.
    pub text: String,
    /// Fill color recorded on the span.
    pub color: String,
}

/// Result of a delete call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Records removed by this call; zero on a repeated delete.
    pub removed: usize,
    /// Records still persisted for the document afterwards.
    pub remaining: usize,
}

/// Result of a reconcile pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Ids newly anchored by this pass, in collection order.
    pub anchored: Vec<String>,
    /// Ids that exhausted every strategy and stay persisted as lost.
    pub lost: Vec<String>,
    /// Records that already had a live span and were skipped.
    pub already_live: usize,
}

/// Why a single record could not be restored; diagnostics only.
#[derive(Debug)]
enum RestoreFailure {
    NoMatch,
    Materialize(MaterializeError),
}

impl fmt::Display for RestoreFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMatch => write!(f, "no exact or approximate match in the document"),
            Self::Materialize(err) => write!(f, "located but failed to wrap: {err}"),
        }
    }
}

/// Drives the highlight lifecycle for one document key.
///
/// Holds the id counter (seeded at construction, no ambient state) and the
/// per-record anchoring states. Single-threaded by design: correctness under
/// overlapping host events comes from idempotence, not locking.
pub struct Orchestrator<S: HighlightStore> {
    store: S,
    document_key: String,
    next_serial: u64,
    states: HashMap<String, AnchorState>,
}

impl<S: HighlightStore> Orchestrator<S> {
    /// Creates an orchestrator for the document identified by `url`.
    ///
    /// Records already persisted for the document start out
    /// [`AnchorState::Pending`] until a reconcile pass attempts them. A store
    /// read failure here is not fatal; the next reconcile surfaces it.
    pub fn new(store: S, url: &Url) -> Self {
        let document_key = record::document_key(url);
        let states = store
            .get(&document_key)
            .map(|records| {
                records
                    .into_iter()
                    .map(|rec| (rec.id, AnchorState::Pending))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            store,
            document_key,
            next_serial: 0,
            states,
        }
    }

    /// Normalized key partitioning this document's records.
    pub fn document_key(&self) -> &str {
        &self.document_key
    }

    /// Read access to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mutable access to the underlying store, e.g. for draining a
    /// [`MemoryStore`](crate::store::MemoryStore)'s change notifications.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Last observed anchoring state for `id`.
    pub fn state(&self, id: &str) -> Option<AnchorState> {
        self.states.get(id).copied()
    }

    fn next_id(&mut self) -> String {
        self.next_serial += 1;
        format!(
            "hl-{}-{}",
            self.next_serial,
            record::epoch_ms(SystemTime::now())
        )
    }

    /// Creates a highlight from a live selection.
    ///
    /// Wraps the selection immediately, computes the structural anchor, and
    /// appends the record to the persisted collection. If the store write
    /// fails the fresh span is unwrapped again, so neither side keeps partial
    /// state.
    pub fn create_highlight(
        &mut self,
        document: &mut Document,
        range: &SelectionRange,
        color: &str,
    ) -> Result<String, HighlightError> {
        let text = highlight::selection_text(document, range)?;
        if text.trim().is_empty() {
            return Err(HighlightError::EmptySelection);
        }

        let anchor_node = match *range {
            SelectionRange::TextSpan { node, .. } => node,
            SelectionRange::Subtree { node } => node,
        };
        let structural_anchor = anchor::describe(document, anchor_node);

        let id = self.next_id();
        highlight::wrap_selection(document, range, &id, color)?;

        let new_record = HighlightRecord {
            id: id.clone(),
            text,
            color: color.to_string(),
            document_key: self.document_key.clone(),
            created_at_epoch_ms: record::epoch_ms(SystemTime::now()),
            structural_anchor,
        };

        let persisted = match self.store.get(&self.document_key) {
            Ok(mut records) => {
                records.push(new_record);
                self.store.set(&self.document_key, records)
            }
            Err(err) => Err(err),
        };
        if let Err(err) = persisted {
            highlight::unwrap(document, &id);
            return Err(err.into());
        }

        self.states.insert(id.clone(), AnchorState::Anchored);
        Ok(id)
    }

    /// Deletes a highlight by id.
    ///
    /// Idempotent: deleting an id that is already gone reports zero removals
    /// and does not error. The store is updated before the live span is
    /// dissolved, so a store failure leaves the document untouched.
    pub fn delete_highlight(
        &mut self,
        document: &mut Document,
        id: &str,
    ) -> Result<DeleteOutcome, HighlightError> {
        let mut records = self.store.get(&self.document_key)?;
        let before = records.len();
        records.retain(|r| r.id != id);
        let removed = before - records.len();
        let remaining = records.len();

        if removed > 0 {
            if records.is_empty() {
                self.store.remove(&self.document_key)?;
            } else {
                self.store.set(&self.document_key, records)?;
            }
        }

        highlight::unwrap(document, id);
        self.states.insert(id.to_string(), AnchorState::Deleted);
        Ok(DeleteOutcome { removed, remaining })
    }

    /// Removes every record for this document and dissolves every live span.
    pub fn clear_all(&mut self, document: &mut Document) -> Result<usize, HighlightError> {
        let records = self.store.get(&self.document_key)?;
        self.store.remove(&self.document_key)?;
        let unwrapped = highlight::clear_all(document);
        for rec in &records {
            self.states.insert(rec.id.clone(), AnchorState::Deleted);
        }
        Ok(records.len().max(unwrapped))
    }

    /// Highlights currently materialized on the document, in document order.
    pub fn list_current(&self, document: &Document) -> Vec<LiveHighlight> {
        highlight::all_highlights(document)
            .into_iter()
            .filter_map(|span| {
                let element = document.element(span)?;
                Some(LiveHighlight {
                    id: element.attr("id")?.to_string(),
                    text: document.text_content(span),
                    color: highlight::span_color(document, span)
                        .unwrap_or_default()
                        .to_string(),
                })
            })
            .collect()
    }

    /// Changes a highlight's color, overwriting the record in place.
    ///
    /// The id stays stable. Returns `false` when no record carries `id`.
    pub fn set_color(
        &mut self,
        document: &mut Document,
        id: &str,
        color: &str,
    ) -> Result<bool, HighlightError> {
        let mut records = self.store.get(&self.document_key)?;
        let Some(rec) = records.iter_mut().find(|r| r.id == id) else {
            return Ok(false);
        };
        rec.color = color.to_string();
        self.store.set(&self.document_key, records)?;
        highlight::recolor(document, id, color);
        Ok(true)
    }

    /// Attempts to re-anchor every persisted record that is not currently
    /// live.
    ///
    /// Strategy order per record: exact search under the resolved structural
    /// anchor, exact search over the whole document, then the approximate
    /// fallback under the anchor and finally document-wide. Records are
    /// processed independently; one failure never blocks the rest. Zero
    /// records is a no-op with no DOM changes. Records the user already
    /// deleted in this session are skipped even if a stale store write
    /// resurfaces them.
    pub fn reconcile(&mut self, document: &mut Document) -> Result<ReconcileOutcome, HighlightError> {
        let records = self.store.get(&self.document_key)?;
        let mut outcome = ReconcileOutcome::default();

        for rec in &records {
            let state = *self
                .states
                .entry(rec.id.clone())
                .or_insert(AnchorState::Pending);
            if state == AnchorState::Deleted {
                continue;
            }
            if highlight::is_present(document, &rec.id) {
                outcome.already_live += 1;
                self.states.insert(rec.id.clone(), AnchorState::Anchored);
                continue;
            }
            match self.restore_one(document, rec) {
                Ok(()) => {
                    self.states.insert(rec.id.clone(), AnchorState::Anchored);
                    outcome.anchored.push(rec.id.clone());
                }
                Err(_reason) => {
                    crate::debug_log!("hilite: {} not restored: {_reason}", rec.id);
                    self.states.insert(rec.id.clone(), AnchorState::Lost);
                    outcome.lost.push(rec.id.clone());
                }
            }
        }
        Ok(outcome)
    }

    /// Routes a host event into the appropriate reconcile flavor.
    pub fn handle_event(
        &mut self,
        document: &mut Document,
        event: Event,
    ) -> Result<ReconcileOutcome, HighlightError> {
        match event {
            Event::DocumentLoaded | Event::VisibilityRegained | Event::FocusRegained => {
                self.reconcile(document)
            }
            Event::StorageChanged { key } if key == self.document_key => self.reconcile(document),
            Event::StorageChanged { .. } => Ok(ReconcileOutcome::default()),
            Event::SubtreeMutated { roots } => self.reconcile_roots(document, &roots),
        }
    }

    /// Scans freshly added subtrees for text matching records that are not
    /// currently live; records that still do not match are left alone.
    fn reconcile_roots(
        &mut self,
        document: &mut Document,
        roots: &[NodeId],
    ) -> Result<ReconcileOutcome, HighlightError> {
        let records = self.store.get(&self.document_key)?;
        let mut outcome = ReconcileOutcome::default();

        for rec in &records {
            let state = *self
                .states
                .entry(rec.id.clone())
                .or_insert(AnchorState::Pending);
            if state == AnchorState::Deleted {
                continue;
            }
            if highlight::is_present(document, &rec.id) {
                outcome.already_live += 1;
                continue;
            }
            let found = roots.iter().find_map(|root| {
                locate::find_exact(document, *root, &rec.text)
                    .or_else(|| locate::find_approximate(document, *root, &rec.text))
            });
            let Some(found) = found else {
                continue;
            };
            match highlight::wrap_match(document, &found, &rec.id, &rec.color) {
                Ok(_) => {
                    self.states.insert(rec.id.clone(), AnchorState::Anchored);
                    outcome.anchored.push(rec.id.clone());
                }
                Err(_err) => {
                    crate::debug_log!("hilite: {} matched added subtree but: {_err}", rec.id);
                }
            }
        }
        Ok(outcome)
    }

    fn restore_one(
        &self,
        document: &mut Document,
        rec: &HighlightRecord,
    ) -> Result<(), RestoreFailure> {
        let found = self
            .locate_record(document, rec)
            .ok_or(RestoreFailure::NoMatch)?;
        highlight::wrap_match(document, &found, &rec.id, &rec.color)
            .map(|_| ())
            .map_err(RestoreFailure::Materialize)
    }

    fn locate_record(&self, document: &Document, rec: &HighlightRecord) -> Option<TextMatch> {
        let anchor_root = rec
            .structural_anchor
            .as_ref()
            .and_then(|hint| anchor::resolve(document, hint));

        if let Some(root) = anchor_root {
            if let Some(found) = locate::find_exact(document, root, &rec.text) {
                return Some(found);
            }
        }
        if let Some(found) = locate::find_exact(document, document.root(), &rec.text) {
            return Some(found);
        }
        if let Some(root) = anchor_root {
            if let Some(found) = locate::find_approximate(document, root, &rec.text) {
                return Some(found);
            }
        }
        locate::find_approximate(document, document.root(), &rec.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn page_url() -> Url {
        Url::parse("https://example.com/article").unwrap()
    }

    fn first_text_range(document: &Document, needle: &str) -> SelectionRange {
        let hit = locate::find_exact(document, document.root(), needle).expect("selection");
        SelectionRange::TextSpan {
            node: hit.node,
            start: hit.start,
            end: hit.end,
        }
    }

    #[test]
    fn create_rejects_blank_selection() {
        let mut document = Document::parse_html("<p>   </p>");
        let mut engine = Orchestrator::new(MemoryStore::new(), &page_url());
        let node = document.text_nodes(document.root())[0];
        let range = SelectionRange::TextSpan {
            node,
            start: 0,
            end: 3,
        };
        let err = engine
            .create_highlight(&mut document, &range, "yellow")
            .expect_err("blank selection");
        assert!(matches!(err, HighlightError::EmptySelection));
        assert!(engine.store().get(engine.document_key()).unwrap().is_empty());
    }

    #[test]
    fn rapid_creations_yield_unique_ids() {
        let mut document = Document::parse_html("<p>alpha beta gamma delta epsilon</p>");
        let mut engine = Orchestrator::new(MemoryStore::new(), &page_url());
        let mut ids = Vec::new();
        for word in ["alpha", "beta", "gamma", "delta", "epsilon"] {
            let range = first_text_range(&document, word);
            ids.push(
                engine
                    .create_highlight(&mut document, &range, "gold")
                    .expect("create"),
            );
        }
        let mut deduped = ids.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), ids.len());
    }

    #[test]
    fn failed_store_write_rolls_back_the_wrap() {
        let mut document = Document::parse_html("<p>some words here</p>");
        let before = document.to_html();
        let mut engine = Orchestrator::new(MemoryStore::new(), &page_url());
        engine.store_mut().set_unavailable(true);

        let range = first_text_range(&document, "words");
        let err = engine
            .create_highlight(&mut document, &range, "pink")
            .expect_err("store down");
        assert!(matches!(err, HighlightError::Store(_)));
        assert_eq!(document.to_html(), before);
    }

    #[test]
    fn foreign_storage_events_are_ignored() {
        let mut document = Document::parse_html("<p>content</p>");
        let mut engine = Orchestrator::new(MemoryStore::new(), &page_url());
        let outcome = engine
            .handle_event(
                &mut document,
                Event::StorageChanged {
                    key: "https://other.example/".to_string(),
                },
            )
            .expect("event");
        assert_eq!(outcome, ReconcileOutcome::default());
    }

    #[test]
    fn set_color_keeps_id_stable() {
        let mut document = Document::parse_html("<p>recolor me</p>");
        let mut engine = Orchestrator::new(MemoryStore::new(), &page_url());
        let range = first_text_range(&document, "recolor");
        let id = engine
            .create_highlight(&mut document, &range, "yellow")
            .expect("create");

        assert!(engine.set_color(&mut document, &id, "lime").expect("recolor"));
        let records = engine.store().get(engine.document_key()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id);
        assert_eq!(records[0].color, "lime");
        assert_eq!(engine.list_current(&document)[0].color, "lime");

        assert!(!engine.set_color(&mut document, "hl-404", "red").expect("miss"));
    }
}
