use crate::domain::models::ShiftOwner;
use crate::error::{ScheduleError, ScheduleResult};
use std::collections::HashSet;
use std::sync::Mutex;

const ANY_TRADING_POINT: &str = "*";

pub trait PermissionResolver: Send + Sync {
    fn has_approval_permission(
        &self,
        actor_id: &str,
        owner: &ShiftOwner,
        trading_point_id: &str,
    ) -> ScheduleResult<bool>;
}

#[derive(Debug, Default)]
pub struct StaticPermissionResolver {
    grants: Mutex<HashSet<(String, String)>>,
}

impl StaticPermissionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, actor_id: &str, trading_point_id: &str) -> ScheduleResult<()> {
        let mut grants = self.grants.lock().map_err(|error| {
            ScheduleError::Consistency(format!("permission lock poisoned: {error}"))
        })?;
        grants.insert((actor_id.to_string(), trading_point_id.to_string()));
        Ok(())
    }

    pub fn grant_everywhere(&self, actor_id: &str) -> ScheduleResult<()> {
        self.grant(actor_id, ANY_TRADING_POINT)
    }
}

impl PermissionResolver for StaticPermissionResolver {
    fn has_approval_permission(
        &self,
        actor_id: &str,
        _owner: &ShiftOwner,
        trading_point_id: &str,
    ) -> ScheduleResult<bool> {
        let grants = self.grants.lock().map_err(|error| {
            ScheduleError::Consistency(format!("permission lock poisoned: {error}"))
        })?;
        Ok([trading_point_id, ANY_TRADING_POINT]
            .iter()
            .any(|scope| grants.contains(&(actor_id.to_string(), scope.to_string()))))
    }
}
