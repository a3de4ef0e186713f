use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::coordinate::Coordinate;

/// Device position provider. Implementations may be slow or fail; callers
/// bound them with a timeout.
#[async_trait]
pub trait LocationSource: Send + Sync {
    async fn current_position(&self) -> Result<Coordinate, AppError>;
}

/// Position fed from outside the process (env seed, dashboard, GPS bridge).
/// Reports "unavailable" until a fix has been set.
#[derive(Default)]
pub struct ManualLocation {
    fix: Mutex<Option<Coordinate>>,
}

impl ManualLocation {
    pub fn new(seed: Option<Coordinate>) -> Self {
        Self {
            fix: Mutex::new(seed),
        }
    }

    pub fn set(&self, coordinate: Coordinate) {
        if let Ok(mut guard) = self.fix.lock() {
            *guard = Some(coordinate);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.fix.lock() {
            *guard = None;
        }
    }
}

#[async_trait]
impl LocationSource for ManualLocation {
    async fn current_position(&self) -> Result<Coordinate, AppError> {
        let fix = self
            .fix
            .lock()
            .map_err(|_| AppError::Internal("location lock poisoned".to_string()))?;

        (*fix).ok_or_else(|| AppError::Geolocation("no position fix".to_string()))
    }
}
