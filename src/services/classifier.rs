// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Activity classification from a rolling window of speed samples.

use crate::models::ActivityLabel;
use std::collections::VecDeque;

/// Upper speed bounds (m/s, exclusive) for each activity band.
///
/// Anything at or above `running_max` is classified as cycling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivityThresholds {
    pub stationary_max: f64,
    pub walking_max: f64,
    pub running_max: f64,
}

impl Default for ActivityThresholds {
    fn default() -> Self {
        Self {
            stationary_max: 0.3,
            walking_max: 2.0,
            running_max: 4.5,
        }
    }
}

impl ActivityThresholds {
    /// Build thresholds, rejecting bands that are not strictly increasing.
    pub fn new(stationary_max: f64, walking_max: f64, running_max: f64) -> Option<Self> {
        let ordered = stationary_max.is_finite()
            && running_max.is_finite()
            && 0.0 < stationary_max
            && stationary_max < walking_max
            && walking_max < running_max;

        ordered.then_some(Self {
            stationary_max,
            walking_max,
            running_max,
        })
    }

    /// Map a speed to its band. Negative or NaN speeds are stationary.
    pub fn classify(&self, speed: f64) -> ActivityLabel {
        if speed.is_nan() || speed < self.stationary_max {
            ActivityLabel::Stationary
        } else if speed < self.walking_max {
            ActivityLabel::Walking
        } else if speed < self.running_max {
            ActivityLabel::Running
        } else {
            ActivityLabel::Cycling
        }
    }
}

/// One-shot classification of a single speed sample.
pub fn detect_activity_from_speed(speed: f64, thresholds: &ActivityThresholds) -> ActivityLabel {
    thresholds.classify(speed)
}

/// Smooths recent speeds and labels the current activity.
#[derive(Debug, Clone)]
pub struct ActivityClassifier {
    window: VecDeque<f64>,
    capacity: usize,
    thresholds: ActivityThresholds,
    current: ActivityLabel,
}

impl ActivityClassifier {
    pub fn new(capacity: usize, thresholds: ActivityThresholds) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            thresholds,
            current: ActivityLabel::default(),
        }
    }

    /// Add a speed sample and return the updated label.
    ///
    /// Negative and non-finite speeds never enter the window.
    pub fn add_speed(&mut self, speed: f64) -> ActivityLabel {
        if !speed.is_finite() || speed < 0.0 {
            tracing::debug!(speed, "Ignoring invalid speed sample");
            return self.current;
        }

        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(speed);

        self.current = self.thresholds.classify(self.average_speed());
        self.current
    }

    pub fn current_activity(&self) -> ActivityLabel {
        self.current
    }

    /// Mean of the window, 0 when empty.
    pub fn average_speed(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.window.iter().sum::<f64>() / self.window.len() as f64
    }

    /// Restore a label (e.g. from a backup) without any speed history.
    pub fn restore(&mut self, label: ActivityLabel) {
        self.window.clear();
        self.current = label;
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.current = ActivityLabel::default();
    }
}
