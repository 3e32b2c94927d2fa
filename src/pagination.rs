use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use crate::cache::{FetchKey, QueryCache};
use crate::error::Result;
use crate::service::RecordService;
use crate::types::{Entity, Page, Record, RecordPage};

/// A full page suggests more rows may follow. Placeholder rows belong to
/// another page and say nothing about this one.
pub fn has_next_page(len: usize, page_size: u32, is_placeholder: bool) -> bool {
    !is_placeholder && len == page_size as usize
}

pub fn has_previous_page(page: Page) -> bool {
    page > Page::FIRST
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchStatus {
    #[default]
    Idle,
    Fetching,
    Settled,
}

/// Identifies one request for a list's current page. `navigate` and
/// `invalidate` issue a new generation; completions carrying an older one
/// are not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub key: FetchKey,
    generation: u64,
}

/// What the table should draw right now
#[derive(Debug, Clone, Copy)]
pub struct ListView<'a> {
    pub records: &'a [Record],
    /// Rows are from the previously shown page while the current one loads
    pub is_placeholder: bool,
    /// Nothing to show yet and a fetch is running
    pub is_pending: bool,
    pub error: Option<&'a str>,
    pub count: Option<u64>,
}

/// Page-by-page view over one entity's records
#[derive(Debug)]
pub struct PaginatedList {
    entity: Entity,
    page_size: u32,
    exact_next_page: bool,
    cache: QueryCache,
    service: Arc<dyn RecordService>,
    page: Page,
    generation: u64,
    shown: Option<(Page, Arc<RecordPage>)>,
    status: FetchStatus,
    error: Option<String>,
}

impl PaginatedList {
    pub fn new(
        entity: Entity,
        page_size: u32,
        cache: QueryCache,
        service: Arc<dyn RecordService>,
    ) -> Self {
        Self {
            entity,
            page_size,
            exact_next_page: false,
            cache,
            service,
            page: Page::FIRST,
            generation: 0,
            shown: None,
            status: FetchStatus::Idle,
            error: None,
        }
    }

    /// Decide `has_next_page` from the reported total when there is one
    pub fn with_exact_next_page(mut self, enabled: bool) -> Self {
        self.exact_next_page = enabled;
        self
    }

    pub fn page(&self) -> Page {
        self.page
    }

    pub fn status(&self) -> FetchStatus {
        self.status
    }

    pub fn key(&self, page: Page) -> FetchKey {
        FetchKey::new(self.entity, page)
    }

    pub fn current_key(&self) -> FetchKey {
        self.key(self.page)
    }

    /// Ticket for the fetch of the current page
    pub fn ticket(&self) -> Ticket {
        Ticket {
            key: self.current_key(),
            generation: self.generation,
        }
    }

    /// Resolve `page` through the cache. Safe to spawn.
    pub fn fetch_page(&self, page: Page) -> BoxFuture<'static, Result<Arc<RecordPage>>> {
        self.cache
            .fetch(self.key(page), Arc::clone(&self.service), self.page_size)
    }

    /// Make `page` current. Returns whether its fetch still has to be
    /// driven; otherwise the page was fresh in the cache and is shown.
    pub fn navigate(&mut self, page: Page) -> bool {
        self.page = page;
        self.generation += 1;
        self.error = None;
        let key = self.key(page);

        let cached = self.cache.peek(&key);
        if let Some(data) = &cached {
            self.shown = Some((page, Arc::clone(data)));
        }
        if cached.is_some() && self.cache.is_fresh(&key) {
            self.status = FetchStatus::Settled;
            return false;
        }
        self.status = FetchStatus::Fetching;
        true
    }

    /// Apply a completed fetch. Completions for pages other than the
    /// current one, or issued before the latest `navigate`/`invalidate`,
    /// are ignored; the cache already holds what it should.
    pub fn settle(
        &mut self,
        ticket: Ticket,
        result: std::result::Result<Arc<RecordPage>, String>,
    ) -> bool {
        if ticket != self.ticket() {
            debug!(
                key = %ticket.key,
                current = %self.current_key(),
                generation = ticket.generation,
                latest = self.generation,
                "ignoring superseded fetch"
            );
            return false;
        }
        self.status = FetchStatus::Settled;
        match result {
            Ok(data) => {
                self.shown = Some((ticket.key.page, data));
                self.error = None;
            }
            Err(e) => {
                self.error = Some(e);
            }
        }
        true
    }

    /// Navigate, wait for the page, then warm the next one
    #[cfg(test)]
    pub async fn load(&mut self, page: Page) {
        if self.navigate(page) {
            let ticket = self.ticket();
            let result = self.fetch_page(page).await.map_err(|e| e.to_string());
            self.settle(ticket, result);
        }
        self.prefetch_next();
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(&self.shown, Some((page, _)) if *page != self.page)
    }

    pub fn view(&self) -> ListView<'_> {
        let (records, count) = match &self.shown {
            Some((_, data)) => (data.data.as_slice(), data.count),
            None => (&[][..], None),
        };
        ListView {
            records,
            is_placeholder: self.is_placeholder(),
            is_pending: self.shown.is_none() && self.status == FetchStatus::Fetching,
            error: self.error.as_deref(),
            count,
        }
    }

    pub fn has_next_page(&self) -> bool {
        let Some((_, data)) = &self.shown else {
            return false;
        };
        let is_placeholder = self.is_placeholder();
        if self.exact_next_page {
            if let Some(count) = data.count {
                let seen = u64::from(self.page.get()) * u64::from(self.page_size);
                return !is_placeholder && seen < count;
            }
        }
        has_next_page(data.len(), self.page_size, is_placeholder)
    }

    pub fn has_previous_page(&self) -> bool {
        has_previous_page(self.page)
    }

    /// Start loading the following page in the background when one is
    /// likely to exist
    pub fn prefetch_next(&self) -> bool {
        if !self.has_next_page() {
            return false;
        }
        let key = self.key(self.page.next());
        debug!(%key, "prefetching");
        self.cache
            .prefetch(key, Arc::clone(&self.service), self.page_size);
        true
    }

    /// Drop this entity's cached pages after a write and reload the
    /// current page. Rows stay visible until the reload lands.
    pub fn invalidate(&mut self) -> bool {
        self.cache.invalidate(self.entity);
        self.navigate(self.page)
    }
}
