//! Verb legality against the current skill state.

use shared::domain::{SkillState, Verb};

pub fn legal_predecessors(verb: Verb) -> &'static [SkillState] {
    match verb {
        Verb::Start => &[SkillState::Ready],
        Verb::Stop => &[SkillState::Executing, SkillState::Suspended],
        Verb::Suspend => &[SkillState::Executing],
        Verb::Resume => &[SkillState::Suspended],
        Verb::Reset => &[SkillState::Stopped],
    }
}

/// State a skill reports once `verb` completed successfully.
pub fn resulting_state(verb: Verb) -> SkillState {
    match verb {
        Verb::Start | Verb::Resume => SkillState::Executing,
        Verb::Stop => SkillState::Stopped,
        Verb::Suspend => SkillState::Suspended,
        Verb::Reset => SkillState::Ready,
    }
}

pub fn permits(verb: Verb, state: SkillState) -> bool {
    legal_predecessors(verb).contains(&state)
}

/// Same as [`permits`] for a raw state string; unknown strings permit nothing.
pub fn permits_raw(verb: Verb, raw_state: &str) -> bool {
    SkillState::parse(raw_state).is_some_and(|state| permits(verb, state))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legality_table_matches_lifecycle() {
        let expected = [
            (Verb::Start, vec![SkillState::Ready]),
            (Verb::Stop, vec![SkillState::Executing, SkillState::Suspended]),
            (Verb::Suspend, vec![SkillState::Executing]),
            (Verb::Resume, vec![SkillState::Suspended]),
            (Verb::Reset, vec![SkillState::Stopped]),
        ];
        for (verb, legal) in expected {
            for state in SkillState::ALL {
                assert_eq!(
                    permits(verb, state),
                    legal.contains(&state),
                    "{verb} from {state}"
                );
            }
        }
    }

    #[test]
    fn every_success_lands_in_a_state_some_verb_accepts() {
        for verb in Verb::ALL {
            let next = resulting_state(verb);
            assert!(Verb::ALL.into_iter().any(|v| permits(v, next)));
        }
        assert_eq!(resulting_state(Verb::Reset), SkillState::Ready);
    }

    #[test]
    fn raw_states_use_exact_matching() {
        assert!(permits_raw(Verb::Start, "Ready"));
        assert!(!permits_raw(Verb::Start, "NotReady"));
        assert!(!permits_raw(Verb::Stop, "Executing_Suspended"));
        assert!(!permits_raw(Verb::Reset, ""));
    }
}
