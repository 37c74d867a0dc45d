use bevy::prelude::*;

/// Which hand a controller is held in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Reflect)]
pub enum Hand {
    Left,
    Right,
    #[default]
    Any,
}

impl Hand {
    pub const fn opposite(self) -> Hand {
        match self {
            Hand::Left => Hand::Right,
            Hand::Right => Hand::Left,
            Hand::Any => Hand::Any,
        }
    }
}

/// Resolves the hand a controller currently represents.
///
/// `other_available` is `None` when the controller has no paired controller.
/// `guess` is only called once both controllers are available and is expected to
/// return `Left` or `Right`.
pub fn resolve_hand(
    starting_hand: Hand,
    available: bool,
    other_available: Option<bool>,
    guess: impl FnOnce() -> Hand,
) -> Hand {
    if starting_hand != Hand::Any {
        return starting_hand;
    }
    match other_available {
        Some(false) => Hand::Right,
        Some(true) if available => guess(),
        _ => starting_hand,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_hands_are_returned_as_is() {
        let guess = || panic!("guess must not run for fixed hands");
        assert_eq!(resolve_hand(Hand::Left, false, None, guess), Hand::Left);
        assert_eq!(
            resolve_hand(Hand::Right, true, Some(false), || Hand::Left),
            Hand::Right
        );
    }

    #[test]
    fn unavailable_pair_makes_any_right() {
        assert_eq!(
            resolve_hand(Hand::Any, true, Some(false), || Hand::Left),
            Hand::Right
        );
    }

    #[test]
    fn no_pair_or_unavailable_self_stays_any() {
        assert_eq!(resolve_hand(Hand::Any, true, None, || Hand::Left), Hand::Any);
        assert_eq!(
            resolve_hand(Hand::Any, false, Some(true), || Hand::Left),
            Hand::Any
        );
    }

    #[test]
    fn both_available_uses_guess() {
        assert_eq!(
            resolve_hand(Hand::Any, true, Some(true), || Hand::Left),
            Hand::Left
        );
    }
}
