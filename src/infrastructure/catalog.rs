use crate::domain::consolidator::CatalogSnapshot;
use crate::domain::models::{ShiftType, TradingPoint, WorkCategory};
use crate::error::{ScheduleError, ScheduleResult};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

pub trait CatalogRepository: Send + Sync {
    fn work_category(&self, id: &str) -> ScheduleResult<Option<WorkCategory>>;
    fn shift_type(&self, id: &str) -> ScheduleResult<Option<ShiftType>>;
    fn trading_point(&self, id: &str) -> ScheduleResult<Option<TradingPoint>>;
    fn snapshot(&self) -> ScheduleResult<CatalogSnapshot>;
}

#[derive(Debug, Default)]
struct CatalogState {
    work_categories: HashMap<String, WorkCategory>,
    shift_types: HashMap<String, ShiftType>,
    trading_points: HashMap<String, TradingPoint>,
}

#[derive(Debug, Default)]
pub struct InMemoryCatalogRepository {
    state: Mutex<CatalogState>,
}

impl InMemoryCatalogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> ScheduleResult<MutexGuard<'_, CatalogState>> {
        self.state
            .lock()
            .map_err(|error| ScheduleError::Consistency(format!("catalog lock poisoned: {error}")))
    }

    pub fn insert_work_category(&self, category: WorkCategory) -> ScheduleResult<()> {
        category.validate().map_err(ScheduleError::Validation)?;
        self.lock()?
            .work_categories
            .insert(category.id.clone(), category);
        Ok(())
    }

    pub fn insert_shift_type(&self, shift_type: ShiftType) -> ScheduleResult<()> {
        shift_type.validate().map_err(ScheduleError::Validation)?;
        self.lock()?
            .shift_types
            .insert(shift_type.id.clone(), shift_type);
        Ok(())
    }

    pub fn insert_trading_point(&self, trading_point: TradingPoint) -> ScheduleResult<()> {
        trading_point.validate().map_err(ScheduleError::Validation)?;
        self.lock()?
            .trading_points
            .insert(trading_point.id.clone(), trading_point);
        Ok(())
    }
}

impl CatalogRepository for InMemoryCatalogRepository {
    fn work_category(&self, id: &str) -> ScheduleResult<Option<WorkCategory>> {
        Ok(self.lock()?.work_categories.get(id).cloned())
    }

    fn shift_type(&self, id: &str) -> ScheduleResult<Option<ShiftType>> {
        Ok(self.lock()?.shift_types.get(id).cloned())
    }

    fn trading_point(&self, id: &str) -> ScheduleResult<Option<TradingPoint>> {
        Ok(self.lock()?.trading_points.get(id).cloned())
    }

    fn snapshot(&self) -> ScheduleResult<CatalogSnapshot> {
        let state = self.lock()?;
        Ok(CatalogSnapshot {
            work_categories: state.work_categories.clone(),
            shift_types: state.shift_types.clone(),
        })
    }
}
