use async_trait::async_trait;

use crate::draft::Draft;
use crate::error::Result;
use crate::types::{Entity, Record, RecordPage};

/// Backend holding the managed records
#[async_trait]
pub trait RecordService: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    /// Fetch `limit` records of `entity` starting at offset `skip`
    async fn list(&self, entity: Entity, skip: u32, limit: u32) -> Result<RecordPage>;

    async fn create(&self, draft: &Draft) -> Result<Record>;
    async fn update(&self, id: u64, draft: &Draft) -> Result<Record>;
    async fn delete(&self, entity: Entity, id: u64) -> Result<()>;
}

#[cfg(test)]
pub mod fake {
    //! In-memory backend for cache and controller tests

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::error::RosterError;
    use crate::types::ItemPublic;

    #[derive(Debug, Default)]
    pub struct FakeService {
        items: Mutex<Vec<Record>>,
        calls: AtomicUsize,
        windows: Mutex<Vec<(u32, u32)>>,
        failing_skips: Mutex<Vec<u32>>,
        delay: Option<Duration>,
        first_call_delay: Option<Duration>,
    }

    impl FakeService {
        pub fn with_items(n: u64) -> Self {
            let items = (1..=n)
                .map(|id| {
                    Record::Item(ItemPublic {
                        id,
                        title: format!("item {}", id),
                        description: None,
                        owner_id: 1,
                    })
                })
                .collect();
            Self {
                items: Mutex::new(items),
                ..Self::default()
            }
        }

        pub fn delayed(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        /// Only the first list call waits, so it completes after later ones
        pub fn slow_first_call(mut self, delay: Duration) -> Self {
            self.first_call_delay = Some(delay);
            self
        }

        /// Make every list call at this offset fail
        pub fn fail_at(&self, skip: u32) {
            self.failing_skips.lock().unwrap().push(skip);
        }

        pub fn recover(&self) {
            self.failing_skips.lock().unwrap().clear();
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn windows(&self) -> Vec<(u32, u32)> {
            self.windows.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RecordService for FakeService {
        fn name(&self) -> &str {
            "fake"
        }

        async fn list(&self, _entity: Entity, skip: u32, limit: u32) -> Result<RecordPage> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.windows.lock().unwrap().push((skip, limit));

            // rows are read when the call starts, like a query snapshot
            let failed = self.failing_skips.lock().unwrap().contains(&skip);
            let page = {
                let items = self.items.lock().unwrap();
                RecordPage {
                    data: items
                        .iter()
                        .skip(skip as usize)
                        .take(limit as usize)
                        .cloned()
                        .collect(),
                    count: Some(items.len() as u64),
                }
            };

            let delay = match self.first_call_delay {
                Some(first) if call == 0 => Some(first),
                _ => self.delay,
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if failed {
                return Err(RosterError::Api("503 Service Unavailable".to_string()));
            }
            Ok(page)
        }

        async fn create(&self, _draft: &Draft) -> Result<Record> {
            Err(RosterError::Api("read-only".to_string()))
        }

        async fn update(&self, _id: u64, _draft: &Draft) -> Result<Record> {
            Err(RosterError::Api("read-only".to_string()))
        }

        async fn delete(&self, _entity: Entity, id: u64) -> Result<()> {
            self.items.lock().unwrap().retain(|r| r.id() != id);
            Ok(())
        }
    }
}
