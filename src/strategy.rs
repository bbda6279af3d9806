use std::fmt;

use crate::{PhilosopherState, PhilosopherView};

/// What a philosopher should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Action {
    /// Carry on with the current state.
    None,
    TakeLeftFork,
    TakeRightFork,
    ReleaseLeftFork,
    ReleaseRightFork,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::None => write!(f, "none"),
            Action::TakeLeftFork => write!(f, "take-left"),
            Action::TakeRightFork => write!(f, "take-right"),
            Action::ReleaseLeftFork => write!(f, "release-left"),
            Action::ReleaseRightFork => write!(f, "release-right"),
        }
    }
}

/// Decision policy choosing which fork a philosopher reaches for.
///
/// `decide` must be a pure function of the view: it may not mutate shared
/// state, and one strategy instance is shared by every philosopher of the
/// table, so it is called concurrently.
///
/// Both arbitration modes consult the strategy on every cycle. Under the
/// arbiter, taking either fork requests the whole pair, granted together or
/// not at all; `None` means the philosopher takes nothing.
///
/// # Examples
///
/// ```rust
/// use forkwatch::{Action, PhilosopherView, Strategy};
///
/// /// Never picks anything up.
/// struct Fasting;
///
/// impl Strategy for Fasting {
///     fn decide(&self, _view: &PhilosopherView) -> Action {
///         Action::None
///     }
/// }
/// ```
pub trait Strategy: Send + Sync + 'static {
    fn decide(&self, view: &PhilosopherView) -> Action;

    /// Short name used in logs and reports.
    fn name(&self) -> &str {
        "custom"
    }
}

/// Left fork first, then right, for every philosopher.
///
/// Symmetric across the table, so if every philosopher picks up the left
/// fork at the same time the whole ring waits on itself. Used as the
/// deadlock-prone baseline the detector is meant to catch.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaiveStrategy;

impl Strategy for NaiveStrategy {
    fn decide(&self, view: &PhilosopherView) -> Action {
        match view.state {
            PhilosopherState::Thinking | PhilosopherState::Eating => Action::None,
            PhilosopherState::Hungry => {
                if !view.holds_left && view.left.owner.is_none() {
                    Action::TakeLeftFork
                } else if view.holds_left && !view.holds_right && view.right.owner.is_none() {
                    Action::TakeRightFork
                } else {
                    Action::None
                }
            }
        }
    }

    fn name(&self) -> &str {
        "naive"
    }
}

/// Lower-numbered fork first.
///
/// Every philosopher but the one sitting between the last and the first fork
/// behaves like [`NaiveStrategy`]; that one reaches right first. The global
/// order on forks rules out a circular wait.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderedStrategy;

impl Strategy for OrderedStrategy {
    fn decide(&self, view: &PhilosopherView) -> Action {
        if view.state != PhilosopherState::Hungry {
            return Action::None;
        }

        let left_first = view.left.id < view.right.id;
        let (holds_first, first_free, take_first) = if left_first {
            (view.holds_left, view.left.owner.is_none(), Action::TakeLeftFork)
        } else {
            (view.holds_right, view.right.owner.is_none(), Action::TakeRightFork)
        };
        let (holds_second, second_free, take_second) = if left_first {
            (view.holds_right, view.right.owner.is_none(), Action::TakeRightFork)
        } else {
            (view.holds_left, view.left.owner.is_none(), Action::TakeLeftFork)
        };

        if !holds_first {
            if first_free { take_first } else { Action::None }
        } else if !holds_second && second_free {
            take_second
        } else {
            Action::None
        }
    }

    fn name(&self) -> &str {
        "ordered"
    }
}
