use crate::light::{AreaLight, AreaLightRegistry, IrradiancePolygon};
use rand::Rng;
use std::collections::{HashMap, VecDeque};

/// Synthetic rendering backends.
pub mod scene;

/// Fill a `width × height` mask with ones at the given probability.
pub fn random_mask<R: Rng>(rng: &mut R, width: usize, height: usize, density: f64) -> Vec<u8> {
    (0..width * height)
        .map(|_| u8::from(rng.gen_bool(density)))
        .collect()
}

/// Mask with the listed `(x, y, w, h)` rectangles set.
///
/// # Panics
/// Panics if a rectangle leaves the mask.
#[must_use]
pub fn rect_mask(width: usize, height: usize, rects: &[(usize, usize, usize, usize)]) -> Vec<u8> {
    let mut mask = vec![0u8; width * height];
    for &(x0, y0, w, h) in rects {
        assert!(x0 + w <= width && y0 + h <= height, "rectangle out of bounds");
        for y in y0..y0 + h {
            mask[y * width + x0..y * width + x0 + w].fill(1);
        }
    }
    mask
}

/// Reference 4-connected labeling by breadth-first flood fill. Ids are
/// dense and assigned in scan order of each region's first pixel.
#[must_use]
pub fn flood_fill_labels(mask: &[u8], width: usize, height: usize) -> Vec<u32> {
    let mut out = vec![0u32; width * height];
    let mut next = 0;
    let mut queue = VecDeque::new();
    for start in 0..width * height {
        if mask[start] == 0 || out[start] != 0 {
            continue;
        }
        next += 1;
        out[start] = next;
        queue.push_back(start);
        while let Some(idx) = queue.pop_front() {
            let (x, y) = (idx % width, idx / width);
            let mut neighbours = [None; 4];
            if x > 0 {
                neighbours[0] = Some(idx - 1);
            }
            if x + 1 < width {
                neighbours[1] = Some(idx + 1);
            }
            if y > 0 {
                neighbours[2] = Some(idx - width);
            }
            if y + 1 < height {
                neighbours[3] = Some(idx + width);
            }
            for n in neighbours.into_iter().flatten() {
                if mask[n] != 0 && out[n] == 0 {
                    out[n] = next;
                    queue.push_back(n);
                }
            }
        }
    }
    out
}

/// Identity of a light as seen by [`RecordingRegistry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LightId {
    /// A primary light (only one is tracked).
    Primary,
    /// A secondary light, keyed by `(generation, index)`.
    Secondary(u64, usize),
}

impl LightId {
    fn of(light: AreaLight<'_>) -> Self {
        match light {
            AreaLight::Primary(_) => Self::Primary,
            AreaLight::Secondary(polygon) => {
                let (generation, index) = polygon.key();
                Self::Secondary(generation, index)
            }
        }
    }
}

/// One call received by [`RecordingRegistry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistryEvent {
    /// `register`.
    Register(LightId),
    /// `update`.
    Update(LightId),
    /// `unregister`.
    Unregister(LightId),
}

/// Registry that records every call and checks register/unregister pairing.
#[derive(Debug, Default)]
pub struct RecordingRegistry {
    events: Vec<RegistryEvent>,
    live: HashMap<LightId, Option<IrradiancePolygon>>,
    violations: usize,
}

impl RecordingRegistry {
    /// All calls since the last [`clear_events`](Self::clear_events).
    pub fn events(&self) -> &[RegistryEvent] {
        &self.events
    }

    /// Forget the recorded calls; registration state is kept.
    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Number of recorded `register` calls.
    pub fn register_count(&self) -> usize {
        self.count(|e| matches!(e, RegistryEvent::Register(_)))
    }

    /// Number of recorded `update` calls.
    pub fn update_count(&self) -> usize {
        self.count(|e| matches!(e, RegistryEvent::Update(_)))
    }

    /// Number of recorded `unregister` calls.
    pub fn unregister_count(&self) -> usize {
        self.count(|e| matches!(e, RegistryEvent::Unregister(_)))
    }

    fn count(&self, pred: impl Fn(&RegistryEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    /// Secondary lights currently registered, in no particular order.
    pub fn live_polygons(&self) -> impl Iterator<Item = &IrradiancePolygon> {
        self.live.values().flatten()
    }

    /// Number of lights currently registered.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Calls that broke pairing: double `register`, or `update`/`unregister`
    /// of a light that is not registered.
    pub fn violations(&self) -> usize {
        self.violations
    }

    /// True when nothing is registered and no call broke pairing.
    pub fn is_balanced(&self) -> bool {
        self.live.is_empty() && self.violations == 0
    }
}

fn snapshot(light: AreaLight<'_>) -> Option<IrradiancePolygon> {
    match light {
        AreaLight::Primary(_) => None,
        AreaLight::Secondary(polygon) => Some(polygon.clone()),
    }
}

impl AreaLightRegistry for RecordingRegistry {
    fn register(&mut self, light: AreaLight<'_>) {
        let id = LightId::of(light);
        self.events.push(RegistryEvent::Register(id));
        if self.live.insert(id, snapshot(light)).is_some() {
            self.violations += 1;
        }
    }

    fn update(&mut self, light: AreaLight<'_>) {
        let id = LightId::of(light);
        self.events.push(RegistryEvent::Update(id));
        match self.live.get_mut(&id) {
            Some(slot) => *slot = snapshot(light),
            None => self.violations += 1,
        }
    }

    fn unregister(&mut self, light: AreaLight<'_>) {
        let id = LightId::of(light);
        self.events.push(RegistryEvent::Unregister(id));
        if self.live.remove(&id).is_none() {
            self.violations += 1;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::PrimaryAreaLight;
    use nalgebra::{Matrix4, Vector3};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_rect_mask_and_flood_fill() {
        let mask = rect_mask(8, 4, &[(0, 0, 2, 2), (4, 1, 3, 3)]);
        let labels = flood_fill_labels(&mask, 8, 4);
        assert_eq!(labels[0], 1);
        assert_eq!(labels[8 + 1], 1);
        assert_eq!(labels[8 + 4], 2);
        assert_eq!(labels.iter().filter(|&&l| l == 2).count(), 9);
    }

    #[test]
    fn test_random_mask_is_reproducible() {
        let a = random_mask(&mut ChaCha8Rng::seed_from_u64(3), 16, 16, 0.5);
        let b = random_mask(&mut ChaCha8Rng::seed_from_u64(3), 16, 16, 0.5);
        assert_eq!(a, b);
        assert!(a.iter().all(|&v| v <= 1));
    }

    #[test]
    fn test_recording_registry_pairs_calls() {
        let light = PrimaryAreaLight::new(Matrix4::identity(), Vector3::z());
        let mut registry = RecordingRegistry::default();
        registry.register(AreaLight::Primary(&light));
        registry.update(AreaLight::Primary(&light));
        assert_eq!(registry.live_count(), 1);
        assert!(!registry.is_balanced());

        registry.unregister(AreaLight::Primary(&light));
        assert!(registry.is_balanced());

        registry.unregister(AreaLight::Primary(&light));
        assert_eq!(registry.violations(), 1);
        assert_eq!(registry.events().len(), 4);
        assert_eq!(registry.unregister_count(), 2);
    }
}
