//! Screen bindings.
//!
//! A [`ScreenBinding`] ties one rendered list to one entity store for as long
//! as the screen is visible. Mounting registers push listeners, starts the
//! bulk fetch and spawns the reconciler task that exclusively owns the store.
//! Every input (fetch result, push event, local mutation) travels through a
//! single inbox, so store mutations are serialized by construction.
//!
//! A binding only renders while the session that mounted it is alive. A 401
//! on any of its calls, or the session ending elsewhere, revokes it: its
//! listeners are removed, the reconciler stops and the screen is cleared.
//!
//! [`AggregateBinding`] does the same for the dashboard and analytics
//! snapshots, which are replaced wholesale rather than reconciled.

use crate::actions::Action;
use crate::error::{SyncError, SyncResult};
use crate::push::{EntityCallbacks, EntitySubscription, Listener, PushChannel, SubscriptionHandle};
use crate::reconciler::{LocalMutation, Reconciler, SyncInput};
use crate::session::Session;
use crate::transport::Transport;
use modboard_types::{
    ANALYTICS_UPDATED, AnalyticsPanel, DashboardStats, EntityKind, ListQuery, Pagination,
    PushEvent, Record, STATS_UPDATED, TimeRange,
};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Draws a screen's records. Called after every store mutation.
pub trait Renderer: Send + Sync + 'static {
    fn render(&self, kind: EntityKind, records: &[Record]);
}

impl<F> Renderer for F
where
    F: Fn(EntityKind, &[Record]) + Send + Sync + 'static,
{
    fn render(&self, kind: EntityKind, records: &[Record]) {
        self(kind, records)
    }
}

/// A renderer that draws nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn render(&self, _kind: EntityKind, _records: &[Record]) {}
}

/// What a screen currently shows.
#[derive(Debug, Clone, Default)]
pub struct ScreenSnapshot {
    pub records: Arc<Vec<Record>>,
    /// Whether the first fetch (or its failure) has been applied.
    pub seeded: bool,
    /// Number of renders so far.
    pub revision: u64,
    /// Last failure worth showing to the user.
    pub error: Option<String>,
    /// Paging details from the latest fetch, when the server sent them.
    pub pagination: Option<Pagination>,
    /// Set once the session behind this screen ended.
    pub revoked: bool,
}

impl ScreenSnapshot {
    pub fn ids(&self) -> Vec<String> {
        self.records.iter().map(|r| r.id().to_string()).collect()
    }
}

struct Envelope {
    input: SyncInput,
    applied: Option<oneshot::Sender<()>>,
}

// State shared between the binding and its tasks. `live` is held across
// every render so nothing draws after an unmount returns.
struct Mount {
    kind: EntityKind,
    push: Arc<PushChannel>,
    renderer: Arc<dyn Renderer>,
    snapshot: watch::Sender<ScreenSnapshot>,
    live: Mutex<bool>,
    subscription: Mutex<Option<EntitySubscription>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Mount {
    fn lock_live(&self) -> MutexGuard<'_, bool> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_live(&self) -> bool {
        *self.lock_live()
    }

    /// Renders and publishes `records`. Returns `false` once unmounted.
    fn publish(&self, records: Vec<Record>, seeded: bool, error: Option<String>) -> bool {
        let live = self.lock_live();
        if !*live {
            return false;
        }
        self.renderer.render(self.kind, &records);
        self.snapshot.send_modify(|current| {
            current.records = Arc::new(records);
            current.seeded = seeded;
            current.revision += 1;
            if error.is_some() {
                current.error = error;
            }
        });
        drop(live);
        true
    }

    fn unmount(&self) -> bool {
        {
            let mut live = self.lock_live();
            if !*live {
                return false;
            }
            *live = false;
        }
        self.release();
        true
    }

    /// Unmounts and clears the screen after the session ended.
    fn revoke(&self) {
        {
            let mut live = self.lock_live();
            if !*live {
                return;
            }
            *live = false;
            self.renderer.render(self.kind, &[]);
            self.snapshot.send_modify(|current| {
                current.records = Arc::default();
                current.revision += 1;
                current.error = Some(SyncError::Unauthorized.to_string());
                current.pagination = None;
                current.revoked = true;
            });
        }
        self.release();
        info!("Revoked {} screen: session ended", self.kind);
    }

    fn release(&self) {
        if let Some(subscription) = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            self.push.unsubscribe_entity(subscription);
        }
        for task in self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            task.abort();
        }
    }
}

/// One mounted screen.
pub struct ScreenBinding {
    mount: Arc<Mount>,
    transport: Arc<dyn Transport>,
    inbox: mpsc::UnboundedSender<Envelope>,
    query: Mutex<ListQuery>,
}

impl ScreenBinding {
    /// Mounts a screen for `kind`. Must be called within a Tokio runtime.
    ///
    /// Push listeners are registered before the fetch starts; events that
    /// beat the fetch are replayed once it lands.
    pub fn mount(
        kind: EntityKind,
        transport: Arc<dyn Transport>,
        push: Arc<PushChannel>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self::mount_with_query(kind, ListQuery::default(), transport, push, renderer)
    }

    /// Mounts a screen whose fetches carry `query` (page, search, filters).
    pub fn mount_with_query(
        kind: EntityKind,
        query: ListQuery,
        transport: Arc<dyn Transport>,
        push: Arc<PushChannel>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        let (inbox, inbox_rx) = mpsc::unbounded_channel::<Envelope>();
        let mount = Arc::new(Mount {
            kind,
            push: push.clone(),
            renderer,
            snapshot: watch::Sender::new(ScreenSnapshot::default()),
            live: Mutex::new(true),
            subscription: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        });

        let forward = {
            let inbox = inbox.clone();
            let listener: Listener = Arc::new(move |event: &PushEvent| {
                let _ = inbox.send(Envelope {
                    input: SyncInput::Push(event.clone()),
                    applied: None,
                });
            });
            listener
        };
        *mount
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner) =
            Some(push.subscribe_entity(kind, EntityCallbacks::all(forward)));

        let reconcile = tokio::spawn(run_reconciler(
            Reconciler::new(kind),
            inbox_rx,
            mount.clone(),
        ));
        let fetch = tokio::spawn(fetch_initial(
            query.path(kind),
            transport.clone(),
            inbox.clone(),
            mount.clone(),
        ));
        let watcher = tokio::spawn(revoke_on_logout(transport.session().watch(), mount.clone()));
        mount
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([reconcile, fetch, watcher]);
        // The watcher may have revoked before the tasks were recorded.
        if !mount.is_live() {
            mount.release();
        }
        info!("Mounted {kind} screen");

        Self {
            mount,
            transport,
            inbox,
            query: Mutex::new(query),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.mount.kind
    }

    pub fn is_mounted(&self) -> bool {
        self.mount.is_live()
    }

    /// The query sent with every fetch.
    pub fn query(&self) -> ListQuery {
        self.query
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> ScreenSnapshot {
        self.mount.snapshot.borrow().clone()
    }

    /// Current records.
    pub fn records(&self) -> Arc<Vec<Record>> {
        self.mount.snapshot.borrow().records.clone()
    }

    /// Receiver that observes every published snapshot.
    pub fn watch(&self) -> watch::Receiver<ScreenSnapshot> {
        self.mount.snapshot.subscribe()
    }

    /// Waits until a snapshot satisfies `predicate`.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&ScreenSnapshot) -> bool,
    ) -> SyncResult<ScreenSnapshot> {
        let mut rx = self.mount.snapshot.subscribe();
        let snapshot = rx
            .wait_for(predicate)
            .await
            .map_err(|_| SyncError::Unmounted)?;
        Ok(snapshot.clone())
    }

    /// Runs a moderation action. On success the store change has been
    /// applied once this returns, or, before the first fetch lands, once it
    /// has been replayed on top of the fetched records. On failure the store
    /// is untouched; a 401 revokes the screen.
    pub async fn perform(&self, action: Action) -> SyncResult<()> {
        if !self.is_mounted() {
            return Err(SyncError::Unmounted);
        }
        let kind = self.kind();
        match action.execute(self.transport.as_ref(), kind).await {
            Ok(mutation) => self.apply_local(mutation).await,
            Err(e) => {
                if e.is_unauthorized() {
                    self.mount.revoke();
                } else if e.is_user_visible() {
                    warn!("{} {} on {kind} failed: {e}", action.name(), action.target());
                } else {
                    debug!("{} {} on {kind} failed: {e}", action.name(), action.target());
                }
                Err(e)
            }
        }
    }

    /// Applies a store change directly. Returns once it has been applied to
    /// seeded records, so before the first fetch it waits for the fetch.
    pub async fn apply_local(&self, mutation: LocalMutation) -> SyncResult<()> {
        self.submit(SyncInput::Local(mutation)).await
    }

    /// Re-fetches with the current query and replaces the store with the
    /// result.
    pub async fn refresh(&self) -> SyncResult<()> {
        if !self.is_mounted() {
            return Err(SyncError::Unmounted);
        }
        let path = self.query().path(self.kind());
        let payload = match self.transport.get(&path).await {
            Ok(payload) => payload,
            Err(e) => {
                if e.is_unauthorized() {
                    self.mount.revoke();
                }
                return Err(e);
            }
        };
        let records = payload.records(self.kind()).records;
        if payload.pagination.is_some() {
            self.mount.snapshot.send_modify(|current| {
                current.pagination = payload.pagination.clone();
            });
        }
        self.submit(SyncInput::FetchCompleted(records)).await
    }

    /// Replaces the query (next page, new search term) and re-fetches.
    pub async fn refresh_with(&self, query: ListQuery) -> SyncResult<()> {
        *self.query.lock().unwrap_or_else(PoisonError::into_inner) = query;
        self.refresh().await
    }

    async fn submit(&self, input: SyncInput) -> SyncResult<()> {
        let (applied, done) = oneshot::channel();
        self.inbox
            .send(Envelope {
                input,
                applied: Some(applied),
            })
            .map_err(|_| SyncError::Unmounted)?;
        done.await.map_err(|_| SyncError::Unmounted)
    }

    /// Deregisters the listeners registered at mount and stops the
    /// reconciler. Idempotent.
    pub fn unmount(&self) {
        if self.mount.unmount() {
            info!("Unmounted {} screen", self.kind());
        }
    }

    /// Handles registered at mount (empty once unmounted).
    pub fn subscription_handles(&self) -> Vec<SubscriptionHandle> {
        self.mount
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.handles().to_vec())
            .unwrap_or_default()
    }
}

impl Drop for ScreenBinding {
    fn drop(&mut self) {
        self.unmount();
    }
}

async fn fetch_initial(
    path: String,
    transport: Arc<dyn Transport>,
    inbox: mpsc::UnboundedSender<Envelope>,
    mount: Arc<Mount>,
) {
    let kind = mount.kind;
    let result = transport.get(&path).await;
    if !mount.is_live() {
        debug!("{kind}: discarding fetch result after unmount");
        return;
    }
    let input = match result {
        Ok(payload) => {
            let extracted = payload.records(kind);
            if extracted.skipped > 0 {
                warn!("{kind}: skipped {} records without an id", extracted.skipped);
            }
            debug!("{kind}: fetched {} records", extracted.records.len());
            if payload.pagination.is_some() {
                mount.snapshot.send_modify(|current| {
                    current.pagination = payload.pagination.clone();
                });
            }
            SyncInput::FetchCompleted(extracted.records)
        }
        Err(e) if e.is_unauthorized() => {
            mount.revoke();
            return;
        }
        Err(e) => SyncInput::FetchFailed(describe(&e)),
    };
    let _ = inbox.send(Envelope {
        input,
        applied: None,
    });
}

async fn revoke_on_logout(mut session: watch::Receiver<Option<Session>>, mount: Arc<Mount>) {
    if session.wait_for(Option::is_none).await.is_ok() {
        mount.revoke();
    }
}

async fn run_reconciler(
    mut reconciler: Reconciler,
    mut inbox: mpsc::UnboundedReceiver<Envelope>,
    mount: Arc<Mount>,
) {
    let kind = reconciler.kind();
    // Acks for inputs deferred until the first fetch.
    let mut pending: Vec<oneshot::Sender<()>> = Vec::new();
    while let Some(Envelope { input, applied }) = inbox.recv().await {
        let error = match &input {
            SyncInput::FetchFailed(reason) => Some(reason.clone()),
            _ => None,
        };
        if reconciler.apply(input) {
            let records = reconciler.store().read();
            if !mount.publish(records, reconciler.is_seeded(), error) {
                break;
            }
        }
        pending.extend(applied);
        if reconciler.is_seeded() {
            for applied in pending.drain(..) {
                let _ = applied.send(());
            }
        }
    }
    debug!("{kind}: reconciler stopped");
}

// Outages stay quiet; anything else is kept for display.
fn describe(err: &SyncError) -> String {
    if err.is_user_visible() {
        warn!("Initial fetch failed: {err}");
    } else {
        debug!("Initial fetch failed: {err}");
    }
    err.to_string()
}

/// The latest aggregate snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateSnapshot<T> {
    pub value: Option<T>,
    pub revision: u64,
    /// Set once the session behind this panel ended.
    pub revoked: bool,
}

/// A mounted dashboard or analytics panel.
pub struct AggregateBinding<T> {
    shared: Arc<Aggregate<T>>,
}

struct Aggregate<T> {
    push: Arc<PushChannel>,
    snapshot: watch::Sender<AggregateSnapshot<T>>,
    live: Mutex<bool>,
    handle: Mutex<Option<SubscriptionHandle>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<T> Aggregate<T> {
    fn is_live(&self) -> bool {
        *self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // A pushed value always wins; the fetch only fills an empty panel.
    fn publish(&self, value: T, from_fetch: bool) {
        let live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        if !*live {
            return;
        }
        let mut value = Some(value);
        self.snapshot.send_if_modified(|current| {
            if from_fetch && current.revision > 0 {
                return false;
            }
            current.value = value.take();
            current.revision += 1;
            true
        });
    }

    fn stop(&self, revoked: bool) -> bool {
        {
            let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
            if !*live {
                return false;
            }
            *live = false;
            if revoked {
                self.snapshot.send_modify(|current| {
                    current.value = None;
                    current.revision += 1;
                    current.revoked = true;
                });
            }
        }
        self.release();
        true
    }

    fn release(&self) {
        if let Some(handle) = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            self.push.unsubscribe(handle);
        }
        for task in self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            task.abort();
        }
    }
}

impl AggregateBinding<DashboardStats> {
    /// Dashboard counters: `GET /admin/dashboard/stats`, then `stats:updated`.
    pub fn dashboard(transport: Arc<dyn Transport>, push: Arc<PushChannel>) -> Self {
        Self::mount(
            "/admin/dashboard/stats".to_string(),
            Some(STATS_UPDATED),
            transport,
            push,
            DashboardStats::from_json,
        )
    }
}

impl AggregateBinding<Value> {
    /// Analytics for a time window: `GET /admin/analytics/stats?range=`,
    /// then `analytics:updated`.
    pub fn analytics(range: TimeRange, transport: Arc<dyn Transport>, push: Arc<PushChannel>) -> Self {
        Self::analytics_panel(AnalyticsPanel::Stats, range, transport, push)
    }

    /// One analytics panel for a time window. Only the stats panel follows
    /// `analytics:updated`; the others are fetched once.
    pub fn analytics_panel(
        panel: AnalyticsPanel,
        range: TimeRange,
        transport: Arc<dyn Transport>,
        push: Arc<PushChannel>,
    ) -> Self {
        let event = (panel == AnalyticsPanel::Stats).then_some(ANALYTICS_UPDATED);
        Self::mount(panel.path(range), event, transport, push, Value::clone)
    }

    /// Recent activity feed: `GET /admin/dashboard/activity`.
    pub fn dashboard_activity(transport: Arc<dyn Transport>, push: Arc<PushChannel>) -> Self {
        Self::mount(
            "/admin/dashboard/activity".to_string(),
            None,
            transport,
            push,
            Value::clone,
        )
    }
}

impl<T> AggregateBinding<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn mount(
        path: String,
        event: Option<&str>,
        transport: Arc<dyn Transport>,
        push: Arc<PushChannel>,
        parse: fn(&Value) -> T,
    ) -> Self {
        let shared = Arc::new(Aggregate {
            push: push.clone(),
            snapshot: watch::Sender::new(AggregateSnapshot {
                value: None,
                revision: 0,
                revoked: false,
            }),
            live: Mutex::new(true),
            handle: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        });

        if let Some(event) = event {
            let target = shared.clone();
            let handle = push.subscribe(event, move |event: &PushEvent| {
                target.publish(parse(&event.data), false);
            });
            *shared.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        }

        let fetch = {
            let shared = shared.clone();
            let transport = transport.clone();
            tokio::spawn(async move {
                match transport.get(&path).await {
                    Ok(payload) if shared.is_live() => shared.publish(parse(&payload.data), true),
                    Ok(_) => debug!("{path}: discarding result after unmount"),
                    Err(e) if e.is_unauthorized() => {
                        shared.stop(true);
                    }
                    Err(e) if e.is_user_visible() => warn!("{path}: {e}"),
                    Err(e) => debug!("{path}: {e}"),
                }
            })
        };
        let watcher = {
            let shared = shared.clone();
            let mut session = transport.session().watch();
            tokio::spawn(async move {
                if session.wait_for(Option::is_none).await.is_ok() {
                    shared.stop(true);
                }
            })
        };
        shared
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([fetch, watcher]);
        if !shared.is_live() {
            shared.release();
        }

        Self { shared }
    }

    pub fn latest(&self) -> Option<T> {
        self.shared.snapshot.borrow().value.clone()
    }

    pub fn watch(&self) -> watch::Receiver<AggregateSnapshot<T>> {
        self.shared.snapshot.subscribe()
    }

    pub fn is_mounted(&self) -> bool {
        self.shared.is_live()
    }

    /// Waits for the first value.
    pub async fn wait_for_value(&self) -> SyncResult<T> {
        let mut rx = self.shared.snapshot.subscribe();
        let snapshot = rx
            .wait_for(|s| s.value.is_some() || s.revoked)
            .await
            .map_err(|_| SyncError::Unmounted)?;
        if snapshot.revoked {
            return Err(SyncError::Unauthorized);
        }
        snapshot.value.clone().ok_or(SyncError::Unmounted)
    }

    pub fn unmount(&self) {
        self.shared.stop(false);
    }
}

impl<T> Drop for AggregateBinding<T> {
    fn drop(&mut self) {
        self.shared.stop(false);
    }
}
