//! Sliding-window anomaly detection: agents whose net displacement over the
//! recent window is negligible are flagged.

use std::collections::{HashMap, VecDeque};

use crate::{Agent, AgentState};

/// Samples retained per agent before flagging can begin.
pub const WINDOW: usize = 40;
/// Net displacement (world units) below which an agent is anomalous.
pub const DISPLACEMENT_THRESHOLD: f32 = 8.0;

/// Bounded per-agent position history with append-and-evict semantics.
#[derive(Debug)]
pub struct AnomalyDetector {
    window: usize,
    threshold: f32,
    histories: HashMap<u32, VecDeque<(f32, f32)>>,
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl AnomalyDetector {
    /// Detector with the standard window and threshold.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(WINDOW, DISPLACEMENT_THRESHOLD)
    }

    /// Detector with explicit limits (used by tests).
    #[must_use]
    pub fn with_limits(window: usize, threshold: f32) -> Self {
        Self {
            window,
            threshold,
            histories: HashMap::new(),
        }
    }

    /// Record every agent's position and overwrite the state of those whose
    /// oldest-to-newest displacement has fallen below the threshold. Agents
    /// with fewer than a full window of samples are never flagged.
    pub fn observe(&mut self, agents: &mut [Agent]) {
        for agent in agents {
            let history = self.histories.entry(agent.id).or_default();
            history.push_back((agent.position.x, agent.position.y));
            while history.len() > self.window {
                history.pop_front();
            }
            if history.len() < self.window {
                continue;
            }
            let (ox, oy) = history.front().copied().unwrap_or_default();
            let (nx, ny) = history.back().copied().unwrap_or_default();
            let dx = nx - ox;
            let dy = ny - oy;
            if (dx * dx + dy * dy).sqrt() < self.threshold {
                agent.state = AgentState::Anomaly;
            }
        }
    }

    /// Number of recorded samples for an agent id.
    #[must_use]
    pub fn samples(&self, id: u32) -> usize {
        self.histories.get(&id).map_or(0, VecDeque::len)
    }

    /// Drop all recorded histories.
    pub fn clear(&mut self) {
        self.histories.clear();
    }
}
