use std::sync::Mutex;

/// The courier currently highlighted in the admin view. Purely a UI hint.
#[derive(Default)]
pub struct Selection {
    current: Mutex<Option<i64>>,
}

impl Selection {
    pub fn select(&self, courier_id: Option<i64>) {
        if let Ok(mut guard) = self.current.lock() {
            *guard = courier_id;
        }
    }

    pub fn current(&self) -> Option<i64> {
        self.current.lock().ok().and_then(|guard| *guard)
    }

    pub fn is_selected(&self, courier_id: i64) -> bool {
        self.current() == Some(courier_id)
    }
}
