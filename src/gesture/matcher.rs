use std::time::Duration;

use super::event::EventHistory;
use super::program::Program;

/// Checks whether the tail of `history` satisfies `program`.
///
/// Returns the settle delay to wait before confirming, or `None` when the
/// program does not match. `relaxed_ordinal` names the event whose following
/// gap is exempt from the first step's minimum when the program opts into the
/// start relaxation.
pub fn fits(program: &Program, history: &EventHistory, relaxed_ordinal: Option<u64>) -> Option<Duration> {
    let steps = program.steps();
    let step_count = steps.len();
    if step_count == 0 || history.len() < step_count {
        return None;
    }

    let offset = history.len() - step_count;
    let mut previous = history.get(offset)?;

    for i in 1..step_count {
        let step = &steps[i - 1];
        let next = history.get(offset + i)?;
        let gap = next.timestamp.checked_sub(previous.timestamp)?;

        let relaxed = i == 1
            && program.relaxed_on_start()
            && relaxed_ordinal.is_some()
            && history.ordinal_of(offset) == relaxed_ordinal;
        let min_gap = if relaxed { Duration::ZERO } else { step.min_gap };

        if previous.is_near != step.expects_near || !step.accepts_gap(gap, min_gap) {
            return None;
        }
        previous = next;
    }

    let last = &steps[step_count - 1];
    (previous.is_near == last.expects_near).then_some(last.min_gap)
}
