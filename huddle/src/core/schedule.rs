//! Deterministic turn assignment for the session engine.

/// The party to consult for the upcoming turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    /// Index into the ordered participant list.
    Participant(usize),
    Coach,
}

/// Decide who speaks next.
///
/// Participants rotate round-robin, indexed by `turn_count % participant_count`.
/// When a coach cadence `c` is configured, the coach interjects before the
/// participant turn whenever `turn_count % c == 0` and `turn_count > 0`,
/// once per full round through the list. Coach turns do not advance
/// `turn_count`, so `coach_spoke_last` suppresses a repeat interjection at the
/// same count.
pub fn next_speaker(
    turn_count: u32,
    participant_count: usize,
    coach_cadence: Option<u32>,
    coach_spoke_last: bool,
) -> Speaker {
    debug_assert!(participant_count > 0);
    if let Some(cadence) = coach_cadence
        && cadence > 0
        && turn_count > 0
        && turn_count % cadence == 0
        && !coach_spoke_last
    {
        return Speaker::Coach;
    }
    Speaker::Participant(turn_count as usize % participant_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Plays out a schedule, advancing the count only on participant turns.
    fn sequence(turns: usize, participants: usize, cadence: Option<u32>) -> Vec<Speaker> {
        let mut out = Vec::new();
        let mut turn_count = 0u32;
        let mut coach_spoke_last = false;
        for _ in 0..turns {
            let speaker = next_speaker(turn_count, participants, cadence, coach_spoke_last);
            out.push(speaker);
            match speaker {
                Speaker::Participant(_) => {
                    turn_count += 1;
                    coach_spoke_last = false;
                }
                Speaker::Coach => coach_spoke_last = true,
            }
        }
        out
    }

    #[test]
    fn round_robin_without_coach() {
        let seq = sequence(4, 2, None);
        assert_eq!(
            seq,
            vec![
                Speaker::Participant(0),
                Speaker::Participant(1),
                Speaker::Participant(0),
                Speaker::Participant(1),
            ]
        );
    }

    #[test]
    fn coach_interjects_once_per_round() {
        let seq = sequence(6, 2, Some(2));
        assert_eq!(
            seq,
            vec![
                Speaker::Participant(0),
                Speaker::Participant(1),
                Speaker::Coach,
                Speaker::Participant(0),
                Speaker::Participant(1),
                Speaker::Coach,
            ]
        );
    }

    #[test]
    fn coach_never_speaks_before_first_turn() {
        assert_eq!(next_speaker(0, 3, Some(3), false), Speaker::Participant(0));
    }

    #[test]
    fn coach_does_not_repeat_at_same_count() {
        assert_eq!(next_speaker(2, 2, Some(2), false), Speaker::Coach);
        assert_eq!(next_speaker(2, 2, Some(2), true), Speaker::Participant(0));
    }
}
