use anyhow::{anyhow, bail, Result};
use serde::Serialize;
use std::time::Duration;

pub const POCKET: &str = "pocket";
pub const WAVE_TO_WAKE: &str = "wave_to_wake";

/// Default time the sensor has to stay covered before a pocket exit wakes.
pub const POCKET_NEAR_MIN: Duration = Duration::from_millis(4000);
pub const WAVE_NEAR_MIN: Duration = Duration::from_millis(200);
pub const WAVE_FAR_MAX: Duration = Duration::from_millis(1500);
pub const WAVE_NEAR_MAX: Duration = Duration::from_millis(1500);

/// Timing constraint between one recorded event and the next.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct ProgramStep {
    pub expects_near: bool,
    pub min_gap: Duration,
    /// `None` means the gap is unbounded.
    pub max_gap: Option<Duration>,
}

impl ProgramStep {
    /// Open interval check: both bounds are excluded.
    pub fn accepts_gap(&self, gap: Duration, min_gap: Duration) -> bool {
        gap > min_gap && self.max_gap.map_or(true, |max| gap < max)
    }
}

/// Declarative description of one gesture.
///
/// Two programs are equal when their names, steps and start relaxation agree,
/// which is what makes enabling or disabling one idempotent.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    name: String,
    steps: Vec<ProgramStep>,
    relaxed_on_start: bool,
}

impl Program {
    pub fn builder(name: impl Into<String>) -> ProgramBuilder {
        ProgramBuilder::new(name)
    }

    /// Covered for at least `near_min`, then uncovered.
    pub fn pocket(near_min: Duration) -> Self {
        Self {
            name: POCKET.into(),
            steps: vec![
                ProgramStep {
                    expects_near: true,
                    min_gap: near_min,
                    max_gap: None,
                },
                ProgramStep {
                    expects_near: false,
                    min_gap: Duration::ZERO,
                    max_gap: Some(Duration::ZERO),
                },
            ],
            relaxed_on_start: true,
        }
    }

    /// Covered for at least `near_min`, uncovered for less than `far_max`,
    /// covered again for less than `near_max`, then uncovered.
    pub fn wave_to_wake(near_min: Duration, far_max: Duration, near_max: Duration) -> Self {
        let near = |min_gap, max_gap| ProgramStep {
            expects_near: true,
            min_gap,
            max_gap,
        };
        let far = |min_gap, max_gap| ProgramStep {
            expects_near: false,
            min_gap,
            max_gap,
        };
        Self {
            name: WAVE_TO_WAKE.into(),
            steps: vec![
                near(near_min, None),
                far(Duration::ZERO, Some(far_max)),
                near(Duration::ZERO, Some(near_max)),
                far(Duration::ZERO, Some(Duration::ZERO)),
            ],
            relaxed_on_start: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[ProgramStep] {
        &self.steps
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn relaxed_on_start(&self) -> bool {
        self.relaxed_on_start
    }

    /// Extra wait after the last step has been observed.
    pub fn settle_delay(&self) -> Duration {
        self.steps.last().map(|s| s.min_gap).unwrap_or_default()
    }
}

/// Fluent builder that flips the expected polarity on every step.
#[derive(Debug, Clone)]
pub struct ProgramBuilder {
    name: String,
    steps: Vec<ProgramStep>,
    relaxed_on_start: bool,
    ended: bool,
    error: Option<&'static str>,
}

impl ProgramBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::with_capacity(4),
            relaxed_on_start: false,
            ended: false,
            error: None,
        }
    }

    pub fn begin(mut self, is_near: bool, min_gap: Duration) -> Self {
        if !self.steps.is_empty() {
            self.fail("begin() called twice");
        }
        self.push(is_near, min_gap, None)
    }

    pub fn add(self, min_gap: Duration, max_gap: Duration) -> Self {
        self.push_flipped(min_gap, Some(max_gap))
    }

    /// Closes the program: the final step only needs the polarity and waits
    /// `min_gap` before confirming.
    pub fn end(mut self, min_gap: Duration) -> Self {
        self = self.push_flipped(min_gap, Some(Duration::ZERO));
        self.ended = true;
        self
    }

    /// Waives the first step's minimum for the first transition seen after
    /// the recognizer starts listening.
    pub fn relax_on_start(mut self) -> Self {
        self.relaxed_on_start = true;
        self
    }

    pub fn build(self) -> Result<Program> {
        if let Some(reason) = self.error {
            bail!("invalid program {:?}: {}", self.name, reason);
        }
        if !self.ended {
            return Err(anyhow!("program {:?} was never closed with end()", self.name));
        }
        Ok(Program {
            name: self.name,
            steps: self.steps,
            relaxed_on_start: self.relaxed_on_start,
        })
    }

    fn push_flipped(mut self, min_gap: Duration, max_gap: Option<Duration>) -> Self {
        let Some(previous) = self.steps.last() else {
            self.fail("step added before begin()");
            return self;
        };
        let is_near = !previous.expects_near;
        self.push(is_near, min_gap, max_gap)
    }

    fn push(mut self, is_near: bool, min_gap: Duration, max_gap: Option<Duration>) -> Self {
        if self.ended {
            self.fail("step added after end()");
            return self;
        }
        self.steps.push(ProgramStep {
            expects_near: is_near,
            min_gap,
            max_gap,
        });
        self
    }

    fn fail(&mut self, reason: &'static str) {
        self.error.get_or_insert(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn builder_alternates_polarity() {
        let program = Program::builder("wave")
            .begin(true, ms(200))
            .add(ms(0), ms(1500))
            .add(ms(0), ms(1500))
            .end(ms(0))
            .build()
            .unwrap();

        let polarity: Vec<bool> = program.steps().iter().map(|s| s.expects_near).collect();
        assert_eq!(polarity, vec![true, false, true, false]);
        assert_eq!(program.steps()[0].max_gap, None);
        assert_eq!(program.settle_delay(), Duration::ZERO);
    }

    #[test]
    fn builtins_match_builder_output() {
        let pocket = Program::builder(POCKET)
            .begin(true, POCKET_NEAR_MIN)
            .end(ms(0))
            .relax_on_start()
            .build()
            .unwrap();
        assert_eq!(pocket, Program::pocket(POCKET_NEAR_MIN));

        let wave = Program::builder(WAVE_TO_WAKE)
            .begin(true, WAVE_NEAR_MIN)
            .add(ms(0), WAVE_FAR_MAX)
            .add(ms(0), WAVE_NEAR_MAX)
            .end(ms(0))
            .build()
            .unwrap();
        assert_eq!(wave, Program::wave_to_wake(WAVE_NEAR_MIN, WAVE_FAR_MAX, WAVE_NEAR_MAX));
    }

    #[test]
    fn programs_compare_by_value() {
        let a = Program::wave_to_wake(ms(200), ms(1500), ms(1500));
        let b = Program::wave_to_wake(ms(200), ms(1500), ms(1500));
        let c = Program::wave_to_wake(ms(300), ms(1500), ms(1500));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn misuse_is_reported_on_build() {
        assert!(Program::builder("x").add(ms(0), ms(1)).end(ms(0)).build().is_err());
        assert!(Program::builder("x").begin(true, ms(0)).build().is_err());
        assert!(Program::builder("x")
            .begin(true, ms(0))
            .end(ms(0))
            .add(ms(0), ms(1))
            .build()
            .is_err());
    }

    #[test]
    fn gap_bounds_are_exclusive() {
        let step = ProgramStep {
            expects_near: false,
            min_gap: ms(0),
            max_gap: Some(ms(1500)),
        };
        assert!(!step.accepts_gap(ms(0), step.min_gap));
        assert!(step.accepts_gap(ms(1), step.min_gap));
        assert!(step.accepts_gap(ms(1499), step.min_gap));
        assert!(!step.accepts_gap(ms(1500), step.min_gap));
    }
}
