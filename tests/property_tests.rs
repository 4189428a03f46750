//! Property-based tests for state machine execution.
//!
//! These tests use proptest to verify properties hold across
//! many randomly generated inputs.

use hsm_actors::core::{Event, EventKind, Guard, State};
use hsm_actors::{event_enum, state_enum, FsmBuilder, Outcome, StateMachineDefinition};
use proptest::prelude::*;

state_enum! {
    enum Level {
        Root,
        Low,
        High,
    }
}

event_enum! {
    enum Signal {
        Up,
        Down,
        Boom,
        Noise,
    }
}

#[derive(Debug, Default)]
struct Meter {
    ups: u32,
    downs: u32,
}

fn meter(capacity: usize) -> StateMachineDefinition<Meter, Level, Signal> {
    let mut builder = FsmBuilder::of(Level::Root);
    builder.history_capacity(capacity);
    builder.root().add(Level::Low).initial();
    builder.root().add(Level::High);
    builder
        .in_state(Level::Low)
        .on(Signal::Up)
        .to(Level::High)
        .execute(|meter: &mut Meter, _| {
            meter.ups += 1;
            Ok(())
        });
    builder
        .in_state(Level::High)
        .on(Signal::Down)
        .to(Level::Low)
        .execute(|meter: &mut Meter, _| {
            meter.downs += 1;
            Ok(())
        });
    builder
        .in_state(Level::High)
        .on(Signal::Boom)
        .to(Level::Low)
        .execute(|_, _| Err(anyhow::anyhow!("overload")));
    builder.build().unwrap()
}

prop_compose! {
    fn arbitrary_signal()(variant in 0..4u8) -> Signal {
        match variant {
            0 => Signal::Up,
            1 => Signal::Down,
            2 => Signal::Boom,
            _ => Signal::Noise,
        }
    }
}

proptest! {
    #[test]
    fn guard_is_deterministic(threshold in 0u32..100, ups in 0u32..100) {
        let guard = Guard::new(move |meter: &Meter, _: &Event<Signal>| meter.ups >= threshold);
        let meter = Meter { ups, downs: 0 };
        let event = Event::of(Signal::Up);

        prop_assert_eq!(guard.check(&meter, &event), guard.check(&meter, &event));
        prop_assert_eq!(guard.check(&meter, &event), ups >= threshold);
    }

    #[test]
    fn names_are_stable(signal in arbitrary_signal()) {
        prop_assert_eq!(signal.name(), signal.name());
        prop_assert_eq!(signal.name(), format!("{:?}", signal));
    }

    #[test]
    fn machine_follows_reference_model(signals in prop::collection::vec(arbitrary_signal(), 0..60)) {
        let mut machine = meter(1_000).create(Meter::default()).unwrap();
        let mut high = false;
        let mut fired = 0usize;

        for signal in signals {
            let result = machine.fire(signal);
            match (high, signal) {
                (false, Signal::Up) => {
                    prop_assert_eq!(result.unwrap(), Outcome::Handled(1));
                    high = true;
                    fired += 1;
                }
                (true, Signal::Down) => {
                    prop_assert_eq!(result.unwrap(), Outcome::Handled(1));
                    high = false;
                    fired += 1;
                }
                // Failure leaves the configuration where it was.
                (true, Signal::Boom) => prop_assert!(result.is_err()),
                _ => prop_assert_eq!(result.unwrap(), Outcome::Ignored),
            }
            let expected = if high { Level::High } else { Level::Low };
            prop_assert_eq!(machine.active_states(), vec![expected]);
        }

        prop_assert_eq!(machine.history().len(), fired);
        let meter = machine.owner();
        prop_assert_eq!((meter.ups + meter.downs) as usize, fired);
    }

    #[test]
    fn history_is_bounded_and_keeps_latest(capacity in 0usize..8, cycles in 0usize..20) {
        let mut machine = meter(capacity).create(Meter::default()).unwrap();
        for _ in 0..cycles {
            machine.fire(Signal::Up).unwrap();
            machine.fire(Signal::Down).unwrap();
        }

        let history = machine.history();
        prop_assert_eq!(history.len(), (cycles * 2).min(capacity));
        if let Some(last) = history.records().last() {
            prop_assert_eq!(last.source, Level::High);
            prop_assert_eq!(last.target, Some(Level::Low));
        }
    }

    #[test]
    fn ignored_events_change_nothing(noise in 1usize..20) {
        let mut machine = meter(16).create(Meter::default()).unwrap();
        for _ in 0..noise {
            prop_assert_eq!(machine.fire(Signal::Noise).unwrap(), Outcome::Ignored);
        }

        prop_assert_eq!(machine.active_states(), vec![Level::Low]);
        prop_assert!(machine.history().is_empty());
    }
}
