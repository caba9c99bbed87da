use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

use crate::map::TileMap;

static MAP_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

fn warn_map_lock_poison_once(operation: &'static str) {
    if MAP_LOCK_POISON_WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!(operation, "tile map lock poisoned; recovered inner value");
    }
}

/// The tile map behind the single lock shared by the update and render
/// threads. Every access is a scoped block; the guard never escapes.
#[derive(Clone)]
pub struct SharedTileMap {
    inner: Arc<Mutex<TileMap>>,
}

impl SharedTileMap {
    pub fn new(map: TileMap) -> Self {
        Self {
            inner: Arc::new(Mutex::new(map)),
        }
    }

    /// Mutating access for the update thread.
    pub fn update<R>(&self, f: impl FnOnce(&mut TileMap) -> R) -> R {
        let mut guard = self.lock("update");
        f(&mut guard)
    }

    /// Access for the render thread. Drawing materializes renderables, so it
    /// needs the map mutably as well.
    pub fn render<R>(&self, f: impl FnOnce(&mut TileMap) -> R) -> R {
        let mut guard = self.lock("render");
        f(&mut guard)
    }

    fn lock(&self, operation: &'static str) -> MutexGuard<'_, TileMap> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn_map_lock_poison_once(operation);
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::geometry::{Position, Vector};
    use crate::map::test_support::uniform_map;

    #[test]
    fn update_and_render_see_the_same_map() {
        let shared = SharedTileMap::new(uniform_map(1.0));
        let other = shared.clone();

        let handle = thread::spawn(move || {
            other.update(|map| {
                map.move_player(Position::ORIGIN, Vector::new(0.0, 0.0, -1.0), 15.0)
            })
        });
        let outcome = handle.join().expect("update thread");

        assert_eq!(outcome.slot.index(), 1);
        let center = shared.render(|map| map.center_name().to_string());
        assert_eq!(center, "tile_0_-1.txt");
    }

    #[test]
    fn access_recovers_after_poison_without_panic() {
        let shared = SharedTileMap::new(uniform_map(1.0));
        let poisoner = shared.clone();
        let _ = thread::spawn(move || {
            poisoner.update(|_| panic!("poison map lock"));
        })
        .join();

        let size = shared.render(|map| map.tile_size());
        assert_eq!(size, 20.0);
    }
}
