mod audit;
mod availability;
mod conflict;
mod error;
mod lifecycle;
mod mutations;
mod queries;
mod store;
mod validate;

pub use audit::{AuditLog, History};
pub use availability::free_slots;
pub use error::{EngineError, ErrorKind};
pub use lifecycle::{next_status, Transition};
pub use store::ResourceBook;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::warn;
use ulid::Ulid;

use crate::catalog::Catalog;
use crate::model::*;
use crate::wal::Wal;

pub type SharedBook = Arc<RwLock<ResourceBook>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) struct WalAppend {
    event: Event,
    response: oneshot::Sender<io::Result<()>>,
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first append arrives.
/// 2. Drain all immediately available appends (the batch window).
/// 3. Single flush_sync for the whole batch.
/// 4. Respond to all senders with the batch result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalAppend>) {
    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];
        while let Ok(next) = rx.try_recv() {
            batch.push(next);
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        metrics::gauge!(crate::observability::WAL_APPENDS).set(wal.appends() as f64);
        if let Err(e) = &result {
            tracing::error!("WAL flush to {} failed: {e}", wal.path().display());
        }

        for append in batch {
            let r = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = append.response.send(r);
        }
    }
}

/// All or nothing: on any error the WAL is left as it was before the batch,
/// so every caller in it sees the failure and replay sees none of it.
fn flush_batch(wal: &mut Wal, batch: &[WalAppend]) -> io::Result<()> {
    for append in batch {
        if let Err(e) = wal.append_buffered(&append.event) {
            wal.discard_buffered();
            return Err(e);
        }
    }
    wal.flush_sync()
}

/// The reservation engine. Owns every reservation and audit entry; reads the
/// room/slot catalog through [`Catalog`].
pub struct Engine {
    /// One book per resource that has ever been reserved.
    pub(super) books: DashMap<Ulid, SharedBook>,
    /// Reverse lookup: reservation id → resource id.
    pub(super) reservation_to_resource: DashMap<Ulid, Ulid>,
    pub(super) audit: AuditLog,
    pub(super) catalog: Arc<dyn Catalog>,
    pub(super) wal_tx: mpsc::Sender<WalAppend>,
}

/// Apply an event to a book and the audit log. The caller holds the book's
/// write lock.
fn apply_to_book(
    book: &mut ResourceBook,
    event: &Event,
    index: &DashMap<Ulid, Ulid>,
    audit: &AuditLog,
) {
    match event {
        Event::ReservationCreated { reservation, .. } => {
            if let Err(existing) = book.insert(reservation.clone()) {
                warn!(
                    "reservation {} overlaps active reservation {existing}; keeping the first",
                    reservation.id
                );
                return;
            }
            index.insert(reservation.id, reservation.resource_id);
        }
        Event::StatusChanged { id, status, at, .. } => {
            if !book.set_status(*id, *status, *at) {
                warn!("status change for unknown reservation {id}");
                return;
            }
        }
    }
    audit.append(event.audit().clone());
}

impl Engine {
    pub fn new(wal_path: PathBuf, catalog: Arc<dyn Catalog>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self::from_parts(catalog, wal_tx);

        // Replay: we're the sole owner of these Arcs, so try_write always
        // succeeds instantly. Never use blocking_write here because this may
        // run inside an async context.
        for event in &events {
            let book = engine.book_for(event.resource_id());
            let mut guard = book.try_write().expect("replay: uncontended write");
            apply_to_book(&mut guard, event, &engine.reservation_to_resource, &engine.audit);
        }

        Ok(engine)
    }

    pub(super) fn from_parts(catalog: Arc<dyn Catalog>, wal_tx: mpsc::Sender<WalAppend>) -> Self {
        Self {
            books: DashMap::new(),
            reservation_to_resource: DashMap::new(),
            audit: AuditLog::new(),
            catalog,
            wal_tx,
        }
    }

    pub fn reservation_count(&self) -> usize {
        self.reservation_to_resource.len()
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalAppend {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Persistence("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Persistence("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Persistence(e.to_string()))
    }

    /// WAL-append then apply. The append is the commit point: if it fails,
    /// neither the state change nor its audit entry becomes visible.
    pub(super) async fn persist_and_apply(
        &self,
        book: &mut ResourceBook,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_book(book, event, &self.reservation_to_resource, &self.audit);
        Ok(())
    }

    pub(super) fn book_for(&self, resource_id: Ulid) -> SharedBook {
        self.books
            .entry(resource_id)
            .or_insert_with(|| Arc::new(RwLock::new(ResourceBook::new(resource_id))))
            .value()
            .clone()
    }

    pub(super) fn get_book(&self, resource_id: &Ulid) -> Option<SharedBook> {
        self.books.get(resource_id).map(|e| e.value().clone())
    }

    pub(super) fn all_books(&self) -> Vec<SharedBook> {
        self.books.iter().map(|e| e.value().clone()).collect()
    }

    fn resolve_book(&self, reservation_id: &Ulid) -> Result<SharedBook, EngineError> {
        let resource_id = self
            .reservation_to_resource
            .get(reservation_id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(*reservation_id))?;
        self.get_book(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))
    }

    /// Lookup reservation → resource book, acquire write lock.
    pub(super) async fn resolve_reservation_write(
        &self,
        reservation_id: &Ulid,
    ) -> Result<OwnedRwLockWriteGuard<ResourceBook>, EngineError> {
        Ok(self.resolve_book(reservation_id)?.write_owned().await)
    }

    /// Lookup reservation → resource book, acquire read lock.
    pub(super) async fn resolve_reservation_read(
        &self,
        reservation_id: &Ulid,
    ) -> Result<OwnedRwLockReadGuard<ResourceBook>, EngineError> {
        Ok(self.resolve_book(reservation_id)?.read_owned().await)
    }
}
