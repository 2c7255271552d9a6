use std::sync::Arc;

use crate::accounting::{AttendanceService, Clock};
use crate::config::Config;
use crate::store::{AttendanceStore, TaskStore, UserStore};
use crate::utils::email_filter::EmailFilter;
use crate::utils::user_cache::UserCache;

/// Shared handler state, registered once as `web::Data<AppState>`.
pub struct AppState {
    pub attendance: AttendanceService,
    pub users: Arc<dyn UserStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub user_cache: UserCache,
    pub email_filter: EmailFilter,
}

impl AppState {
    pub fn new(
        config: &Config,
        attendance: Arc<dyn AttendanceStore>,
        users: Arc<dyn UserStore>,
        tasks: Arc<dyn TaskStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            attendance: AttendanceService::new(
                attendance,
                clock,
                config.day_boundary,
                config.hours_policy,
            ),
            users,
            tasks,
            user_cache: UserCache::default(),
            email_filter: EmailFilter::new(),
        }
    }
}
