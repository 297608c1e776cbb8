/// Weight of the offline (pretrained) score in the default ensemble.
pub const OFFLINE_WEIGHT: f32 = 0.6;
/// Weight of the online (per-user) score in the default ensemble.
pub const ONLINE_WEIGHT: f32 = 0.4;

const WEIGHT_EPSILON: f32 = 1e-9;

/// Combines offline and online decision scores for one span.
pub trait FusionPolicy: std::fmt::Debug + Send + Sync {
    fn fuse(&self, offline: f32, online: f32) -> f32;
}

/// Fixed weighted average; weights are normalized to sum to one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticWeights {
    offline: f32,
    online: f32,
}

impl StaticWeights {
    /// Negative weights are clamped to zero.
    pub fn new(offline: f32, online: f32) -> Self {
        Self {
            offline: offline.max(0.0),
            online: online.max(0.0),
        }
    }
}

impl Default for StaticWeights {
    fn default() -> Self {
        Self::new(OFFLINE_WEIGHT, ONLINE_WEIGHT)
    }
}

impl FusionPolicy for StaticWeights {
    fn fuse(&self, offline: f32, online: f32) -> f32 {
        let total = (self.offline + self.online).max(WEIGHT_EPSILON);
        (self.offline * offline + self.online * online) / total
    }
}
