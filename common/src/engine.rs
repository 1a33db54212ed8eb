use crate::types::{LightCommand, LightState};

/// Absent ticks tolerated while ON before the light is turned off. The
/// transition happens on the tick after this many consecutive misses.
pub const ABSENCE_TICKS_BEFORE_OFF: u32 = 3;

/// Presence hysteresis for a single light.
///
/// The engine starts ON, turns the light on immediately when a device shows
/// up (only inside the active window) and turns it off only after a run of
/// absent ticks. It does no I/O; callers send the returned command.
#[derive(Debug, Clone)]
pub struct LightEngine {
    state: LightState,
    lost: u32,
}

impl Default for LightEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LightEngine {
    pub fn new() -> Self {
        Self {
            state: LightState::On,
            lost: 0,
        }
    }

    pub fn state(&self) -> LightState {
        self.state
    }

    pub fn lost_count(&self) -> u32 {
        self.lost
    }

    /// Advances the engine by one poll.
    ///
    /// `in_active_window` is only consulted when a device is present while
    /// the light is off, so callers can defer the (possibly astronomical)
    /// window computation until it matters.
    pub fn tick<F>(&mut self, present_count: usize, in_active_window: F) -> Option<LightCommand>
    where
        F: FnOnce() -> bool,
    {
        if present_count > 0 {
            self.lost = 0;
            if self.state == LightState::Off && in_active_window() {
                self.state = LightState::On;
                return Some(LightCommand::TurnOn);
            }
            return None;
        }

        if self.state == LightState::Off {
            return None;
        }

        if self.lost >= ABSENCE_TICKS_BEFORE_OFF {
            self.lost = 0;
            self.state = LightState::Off;
            Some(LightCommand::TurnOff)
        } else {
            self.lost += 1;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_off() -> LightEngine {
        LightEngine {
            state: LightState::Off,
            lost: 0,
        }
    }

    fn never() -> bool {
        panic!("active window must not be evaluated")
    }

    #[test]
    fn starts_on_with_no_losses() {
        let engine = LightEngine::new();
        assert_eq!(engine.state(), LightState::On);
        assert_eq!(engine.lost_count(), 0);
    }

    #[test]
    fn turns_off_after_three_absent_ticks() {
        let mut engine = LightEngine::new();

        for expected_lost in 1..=3 {
            assert_eq!(engine.tick(0, never), None);
            assert_eq!(engine.state(), LightState::On);
            assert_eq!(engine.lost_count(), expected_lost);
        }

        assert_eq!(engine.tick(0, never), Some(LightCommand::TurnOff));
        assert_eq!(engine.state(), LightState::Off);
        assert_eq!(engine.lost_count(), 0);
    }

    #[test]
    fn presence_resets_absence_counter() {
        let mut engine = LightEngine::new();

        assert_eq!(engine.tick(0, never), None);
        assert_eq!(engine.tick(0, never), None);
        assert_eq!(engine.tick(0, never), None);
        assert_eq!(engine.tick(2, never), None);
        assert_eq!(engine.lost_count(), 0);

        for _ in 0..3 {
            assert_eq!(engine.tick(0, never), None);
        }
        assert_eq!(engine.state(), LightState::On);
        assert_eq!(engine.tick(0, never), Some(LightCommand::TurnOff));
    }

    #[test]
    fn presence_outside_window_keeps_light_off() {
        let mut engine = engine_off();

        assert_eq!(engine.tick(1, || false), None);
        assert_eq!(engine.state(), LightState::Off);
        assert_eq!(engine.lost_count(), 0);
    }

    #[test]
    fn presence_inside_window_turns_light_on_once() {
        let mut engine = engine_off();
        let mut commands = Vec::new();

        for _ in 0..5 {
            commands.extend(engine.tick(1, || true));
        }

        assert_eq!(commands, vec![LightCommand::TurnOn]);
        assert_eq!(engine.state(), LightState::On);
    }

    #[test]
    fn absence_while_off_is_idle() {
        let mut engine = engine_off();

        for _ in 0..10 {
            assert_eq!(engine.tick(0, never), None);
        }
        assert_eq!(engine.state(), LightState::Off);
        assert_eq!(engine.lost_count(), 0);
    }

    #[test]
    fn window_is_not_evaluated_while_on() {
        let mut engine = LightEngine::new();
        assert_eq!(engine.tick(3, never), None);
    }

    #[test]
    fn full_cycle_emits_one_command_per_transition() {
        let mut engine = LightEngine::new();
        let presence = [1, 0, 0, 0, 0, 0, 0, 1, 1, 1, 0, 0];
        let commands: Vec<_> = presence
            .iter()
            .filter_map(|&count| engine.tick(count, || true))
            .collect();

        assert_eq!(
            commands,
            vec![LightCommand::TurnOff, LightCommand::TurnOn]
        );
        assert_eq!(engine.state(), LightState::On);
        assert_eq!(engine.lost_count(), 2);
    }
}
