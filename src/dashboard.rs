use crate::catalog::CollectionIds;
use crate::record::Record;
use crate::reference;
use crate::storage::RecordStore;
use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct Stats {
    pub kurse: usize,
    pub dozenten: usize,
    pub teilnehmer: usize,
    pub raeume: usize,
    pub anmeldungen: usize,
    pub revenue: f64,
}

/// Sum of course prices over paid enrollments. Enrollments pointing at a
/// missing course, or a course without a price, contribute nothing.
pub fn revenue(kurse: &[Record], anmeldungen: &[Record]) -> f64 {
    anmeldungen
        .iter()
        .filter(|a| a.flag("bezahlt"))
        .filter_map(|a| {
            let kurs_id = reference::decode(a.get("kurs").and_then(Value::as_str));
            kurse.iter().find(|k| k.record_id == kurs_id)
        })
        .filter_map(|k| k.number("preis"))
        .sum()
}

pub fn compute_stats(
    kurse: &[Record],
    dozenten: &[Record],
    teilnehmer: &[Record],
    raeume: &[Record],
    anmeldungen: &[Record],
) -> Stats {
    Stats {
        kurse: kurse.len(),
        dozenten: dozenten.len(),
        teilnehmer: teilnehmer.len(),
        raeume: raeume.len(),
        anmeldungen: anmeldungen.len(),
        revenue: revenue(kurse, anmeldungen),
    }
}

#[derive(Default)]
struct DashboardState {
    stats: Stats,
    loaded: bool,
}

/// Aggregate counts across all collections, recomputed on demand.
pub struct Dashboard {
    ids: CollectionIds,
    store: Arc<dyn RecordStore>,
    state: RwLock<DashboardState>,
    stale: Arc<AtomicBool>,
}

impl Dashboard {
    pub fn new(ids: CollectionIds, store: Arc<dyn RecordStore>) -> Self {
        Self {
            ids,
            store,
            state: RwLock::new(DashboardState::default()),
            stale: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn stats(&self) -> Stats {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .stats
    }

    pub fn is_loading(&self) -> bool {
        !self
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .loaded
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }

    /// Listener for `CollectionController::on_data_change`; marks the stats
    /// for recomputation on the next `refresh`.
    pub fn change_listener(&self) -> impl Fn(&str) + Send + Sync + 'static {
        let stale = Arc::clone(&self.stale);
        move |collection: &str| {
            debug!(collection, "stats invalidated");
            stale.store(true, Ordering::SeqCst);
        }
    }

    /// Recompute stats. Failures are logged and the previous stats kept.
    pub async fn load(&self) {
        if let Err(e) = self.try_load().await {
            warn!(error = %e, "failed to load stats");
            self.state
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .loaded = true;
        }
    }

    pub async fn try_load(&self) -> Result<Stats> {
        self.stale.store(false, Ordering::SeqCst);
        let (kurse, dozenten, teilnehmer, raeume, anmeldungen) = futures::try_join!(
            self.store.list(&self.ids.kurse),
            self.store.list(&self.ids.dozenten),
            self.store.list(&self.ids.teilnehmer),
            self.store.list(&self.ids.raeume),
            self.store.list(&self.ids.anmeldungen),
        )
        .inspect_err(|_| self.stale.store(true, Ordering::SeqCst))?;

        let stats = compute_stats(&kurse, &dozenten, &teilnehmer, &raeume, &anmeldungen);
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.stats = stats;
        state.loaded = true;
        Ok(stats)
    }

    /// Reload only if a change was signalled since the last load.
    pub async fn refresh(&self) {
        if self.is_stale() {
            self.load().await;
        }
    }
}
