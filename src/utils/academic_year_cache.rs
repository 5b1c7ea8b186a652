use moka::future::Cache;
use std::time::Duration;

use crate::attendance::store::{AttendanceStore, StorageError};

/// Holds the id of the current academic year so marking a batch does not
/// hit `academic_years` on every request. `None` (no current year) is
/// cached too.
pub struct AcademicYearCache {
    cache: Cache<(), Option<u64>>,
}

impl AcademicYearCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Cache::builder().max_capacity(1).time_to_live(ttl).build(),
        }
    }

    pub async fn current<S>(&self, store: &S) -> Result<Option<u64>, StorageError>
    where
        S: AttendanceStore + ?Sized,
    {
        self.cache
            .try_get_with((), store.current_academic_year())
            .await
            .map_err(|e| (*e).clone())
    }

    #[cfg(test)]
    fn invalidate(&self) {
        self.cache.invalidate_all();
    }
}
