//! Properties of the ramp state machine over a range of ramp shapes.

use psu_ramp::experiment::{RampController, RampDecision, RampPhase, RampSpec};

fn spec(start_volt: f64, end_volt: f64, step_mv: i32, dual: bool) -> RampSpec {
    RampSpec {
        start_volt,
        end_volt,
        step_mv,
        dual,
    }
}

/// Single ramps covering both directions, tiny and maximal steps, and spans the
/// step does not divide
fn single_ramps() -> Vec<RampSpec> {
    vec![
        spec(0.0, 5.0, 1000, false),
        spec(0.0, 50.0, 7, false),
        spec(1.25, 3.0, 333, false),
        spec(10.0, 2.0, -250, false),
        spec(25.0, 0.0, -1, false),
        spec(4.0, 4.0, 100, false),
    ]
}

fn drain(ramp: &mut RampController, limit: usize) -> Vec<RampDecision> {
    let mut out = Vec::new();
    while out.len() < limit {
        let decision = ramp.advance();
        out.push(decision);
        if decision == RampDecision::Terminate {
            break;
        }
    }
    out
}

#[test]
fn test_single_ramp_terminates_within_bound() {
    for spec in single_ramps() {
        let step = f64::from(spec.step_mv.abs()) / 1000.0;
        let bound = ((spec.end_volt - spec.start_volt).abs() / step).ceil() as usize + 1;

        let mut ramp = RampController::new(spec);
        let decisions = drain(&mut ramp, bound);
        assert_eq!(
            decisions.last(),
            Some(&RampDecision::Terminate),
            "{spec:?} did not terminate within {bound} calls"
        );
        assert_eq!(ramp.phase(), RampPhase::Done);
    }
}

#[test]
fn test_single_ramp_setpoints_stay_within_bounds() {
    for spec in single_ramps() {
        let low = spec.start_volt.min(spec.end_volt);
        let high = spec.start_volt.max(spec.end_volt);

        let mut ramp = RampController::new(spec);
        for decision in drain(&mut ramp, 100_000) {
            match decision {
                RampDecision::ApplySetpoint(volt) => {
                    assert!(
                        (low..=high).contains(&volt),
                        "{spec:?} produced {volt} outside [{low}, {high}]"
                    );
                }
                RampDecision::ReverseAndContinue => panic!("single ramp reversed: {spec:?}"),
                RampDecision::Terminate => {}
            }
        }
    }
}

#[test]
fn test_setpoints_are_monotonic() {
    for spec in single_ramps() {
        let mut ramp = RampController::new(spec);
        let volts: Vec<f64> = drain(&mut ramp, 100_000)
            .into_iter()
            .filter_map(|d| match d {
                RampDecision::ApplySetpoint(v) => Some(v),
                _ => None,
            })
            .collect();
        for pair in volts.windows(2) {
            if spec.step_mv > 0 {
                assert!(pair[1] > pair[0]);
            } else {
                assert!(pair[1] < pair[0]);
            }
        }
    }
}

#[test]
fn test_dual_ramp_reverses_exactly_once() {
    for single in single_ramps() {
        let spec = RampSpec { dual: true, ..single };
        let mut ramp = RampController::new(spec);
        let decisions = drain(&mut ramp, 200_000);

        let reversals = decisions
            .iter()
            .filter(|d| **d == RampDecision::ReverseAndContinue)
            .count();
        assert_eq!(reversals, 1, "{spec:?}");
        assert_eq!(ramp.state().step_mv, -spec.step_mv);
        assert_eq!(decisions.last(), Some(&RampDecision::Terminate));
    }
}

#[test]
fn test_dual_ramp_scenario() {
    let mut ramp = RampController::new(spec(0.0, 5.0, 1000, true));
    for expected in [1.0, 2.0, 3.0, 4.0, 5.0] {
        assert_eq!(ramp.advance(), RampDecision::ApplySetpoint(expected));
    }
    assert_eq!(ramp.advance(), RampDecision::ReverseAndContinue);
    assert_eq!(ramp.phase(), RampPhase::Returning);
    for expected in [4.0, 3.0, 2.0, 1.0, 0.0] {
        assert_eq!(ramp.advance(), RampDecision::ApplySetpoint(expected));
    }
    assert_eq!(ramp.advance(), RampDecision::Terminate);
    assert_eq!(ramp.advance(), RampDecision::Terminate);
}

#[test]
fn test_returning_leg_ends_at_start() {
    let mut ramp = RampController::new(spec(2.0, 3.0, 250, true));
    let last_setpoint = drain(&mut ramp, 100)
        .into_iter()
        .filter_map(|d| match d {
            RampDecision::ApplySetpoint(v) => Some(v),
            _ => None,
        })
        .last();
    assert_eq!(last_setpoint, Some(2.0));
}
