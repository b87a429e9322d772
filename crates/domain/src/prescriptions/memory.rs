use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use cqrs_es::persist::{PersistenceError, ViewContext, ViewRepository};

use super::{Prescription, View};

/// Process-local view repository backing the in-memory event store.
///
/// Applies the same version check as the DynamoDB repository: an update
/// whose context version no longer matches the stored one is rejected.
#[derive(Default)]
pub struct MemViewRepository {
    views: Mutex<HashMap<String, (View, i64)>>,
}

impl MemViewRepository {
    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, (View, i64)>>, PersistenceError> {
        self.views
            .lock()
            .map_err(|err| PersistenceError::UnknownError(err.to_string().into()))
    }
}

#[async_trait]
impl ViewRepository<View, Prescription> for MemViewRepository {
    async fn load(&self, view_id: &str) -> Result<Option<View>, PersistenceError> {
        Ok(self.lock()?.get(view_id).map(|(view, _)| view.clone()))
    }

    async fn load_with_context(
        &self,
        view_id: &str,
    ) -> Result<Option<(View, ViewContext)>, PersistenceError> {
        Ok(self.lock()?.get(view_id).map(|(view, version)| {
            (view.clone(), ViewContext::new(view_id.to_string(), *version))
        }))
    }

    async fn update_view(&self, view: View, context: ViewContext) -> Result<(), PersistenceError> {
        let mut views = self.lock()?;
        let stored = views.get(&context.view_instance_id).map_or(0, |(_, version)| *version);
        if stored != context.version {
            return Err(PersistenceError::OptimisticLockError);
        }
        views.insert(context.view_instance_id, (view, context.version + 1));
        Ok(())
    }
}
