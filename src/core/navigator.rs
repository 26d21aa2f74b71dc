//! Menu navigator
//!
//! The diagnostic menus are modelled as named [`Screen`]s with an explicit
//! transition table. A transition is a list of [`Step`]s (keystrokes, pauses,
//! intermediate waits) followed, unless it is fire-and-forget, by a wait for
//! the target screen's anchor.
//!
//! Entering a screen is idempotent: when the current [`MatchCursor`] already
//! shows the target's marker nothing is sent.

use super::error::{InstrumentError, Result};
use super::matcher::{pause, MatchCursor, Matcher, HOME_PATTERN};
use super::transport::TransportTrait;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Diagnostic screens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Screen {
    /// Running test stopped
    Stopped,
    /// Acquisition system menu
    MainAcq,
    /// Acquisition board 1 or 2
    Acq(u8),
    /// Exercisers menu
    Exercisers,
    /// Registers menu
    Registers,
    /// Register function selection
    SelectFunction,
    /// Register function parameter prompt
    EnterPrompt,
    /// Head number prompt
    HeadNumber,
    /// Extended diagnostics main screen
    ExtendedDiagnostics,
    /// Low-level hardware debugger of a subsystem
    HardwareDebugger(char),
}

impl Screen {
    /// Literal text identifying the screen
    pub fn marker(&self) -> String {
        match self {
            Self::Stopped => " Stopped ".to_string(),
            Self::MainAcq => " Main Acq ".to_string(),
            Self::Acq(board) => format!(" Acq {} ", board),
            Self::Exercisers => " Exercisers ".to_string(),
            Self::Registers => " Registers ".to_string(),
            Self::SelectFunction => "Select function".to_string(),
            Self::EnterPrompt => " Enter".to_string(),
            Self::HeadNumber => "Enter head number".to_string(),
            Self::ExtendedDiagnostics => "EXTENDED DIAGNOSTICS".to_string(),
            Self::HardwareDebugger(_) => "Low-Level Hardware Debugger".to_string(),
        }
    }

    /// Pattern waited for on entry
    pub fn anchor(&self) -> String {
        match self {
            Self::ExtendedDiagnostics | Self::HardwareDebugger(_) => self.marker(),
            _ => format!("{}.*{}", regex::escape(&self.marker()), HOME_PATTERN),
        }
    }
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Acq(board) => write!(f, "Acq {}", board),
            Self::HardwareDebugger(key) => write!(f, "Hardware Debugger ({})", key),
            other => write!(f, "{}", other.marker().trim()),
        }
    }
}

/// One action of a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Send keys as one write
    Send(String),
    /// Send keys one at a time with the key delay
    SendPaced(String),
    /// Wait the settle delay
    Pause,
    /// Wait for an intermediate pattern
    Expect(String),
}

impl Step {
    fn send(keys: &str) -> Self {
        Self::Send(keys.to_string())
    }

    fn expect_home() -> Self {
        Self::Expect(HOME_PATTERN.to_string())
    }
}

/// Keystrokes that move between two screens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Screen the keystrokes are valid on
    pub from: Screen,
    /// Screen reached
    pub to: Screen,
    /// Steps in order
    pub steps: Vec<Step>,
    /// Wait for the target anchor after the steps
    pub await_anchor: bool,
}

impl Transition {
    fn new(from: Screen, to: Screen, steps: Vec<Step>) -> Self {
        Self {
            from,
            to,
            steps,
            await_anchor: true,
        }
    }

    fn fire_and_forget(mut self) -> Self {
        self.await_anchor = false;
        self
    }

    /// Answer the head number prompt
    pub fn select_head(head: u8) -> Self {
        Self::new(
            Screen::HeadNumber,
            Screen::EnterPrompt,
            vec![Step::Send(head.to_string()), Step::Pause],
        )
    }

    /// Look up the table entry for `from` to `to`
    pub fn lookup(from: Screen, to: Screen) -> Option<Self> {
        use Screen::*;

        let transition = match (from, to) {
            (SelectFunction, Stopped) => Self::new(from, to, vec![Step::Pause, Step::send("X")]),
            (_, Stopped) => Self::new(from, to, vec![Step::send("q")]).fire_and_forget(),
            (Stopped, MainAcq) => Self::new(from, to, vec![Step::send("1"), Step::send("d")]),
            (MainAcq, Acq(board)) => {
                let key = match board {
                    1 => "a",
                    2 => "b",
                    _ => return None,
                };
                Self::new(
                    from,
                    to,
                    vec![Step::Pause, Step::send("2"), Step::expect_home(), Step::send(key)],
                )
            }
            (Acq(_), Exercisers) => Self::new(
                from,
                to,
                vec![Step::Pause, Step::send("3"), Step::expect_home(), Step::send("g")],
            ),
            (Exercisers, Registers) => Self::new(
                from,
                to,
                vec![Step::send("4"), Step::expect_home(), Step::send("e")],
            ),
            (Registers, SelectFunction) => Self::new(from, to, vec![Step::Pause, Step::send("r")]),
            (SelectFunction, EnterPrompt) => {
                Self::new(from, to, vec![Step::Pause, Step::send("2")])
            }
            (EnterPrompt, HeadNumber) => Self::new(from, to, vec![Step::Pause, Step::send("\r")]),
            (EnterPrompt, SelectFunction) => {
                Self::new(from, to, vec![Step::Pause, Step::send("\r")])
            }
            (Stopped, ExtendedDiagnostics) => Self::new(
                from,
                to,
                vec![
                    Step::Pause,
                    Step::send("1"),
                    Step::Pause,
                    Step::send("T"),
                    Step::Pause,
                    Step::send("T"),
                ],
            ),
            (ExtendedDiagnostics, HardwareDebugger(key)) => Self::new(
                from,
                to,
                vec![
                    Step::send("1"),
                    Step::Send(key.to_string()),
                    Step::send("D"),
                    Step::Pause,
                ],
            ),
            (HardwareDebugger(_), ExtendedDiagnostics) => {
                Self::new(from, to, vec![Step::send("X")]).fire_and_forget()
            }
            _ => return None,
        };

        Some(transition)
    }

    /// Like [`lookup`](Self::lookup) but a missing entry is an error
    pub fn between(from: Screen, to: Screen) -> Result<Self> {
        Self::lookup(from, to).ok_or(InstrumentError::NoTransition { from, to })
    }
}

/// Delays and wait budget applied while navigating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// Pause between menu actions
    pub settle: Duration,
    /// Delay after each paced keystroke
    pub key_delay: Duration,
    /// Wait budget for each anchor
    pub timeout: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(1),
            key_delay: Duration::from_millis(100),
            timeout: Duration::from_secs(5),
        }
    }
}

impl Pacing {
    /// No delays, for scripted instruments
    pub fn immediate(timeout: Duration) -> Self {
        Self {
            settle: Duration::ZERO,
            key_delay: Duration::ZERO,
            timeout,
        }
    }
}

/// Executes transitions against a matcher
#[derive(Debug, Clone, Default)]
pub struct Navigator {
    pacing: Pacing,
}

impl Navigator {
    /// Create a navigator
    pub fn new(pacing: Pacing) -> Self {
        Self { pacing }
    }

    /// Pacing in use
    pub fn pacing(&self) -> &Pacing {
        &self.pacing
    }

    /// Transitions a route would execute, starting on `from`.
    ///
    /// Hops whose target marker the entry cursor already shows are left out.
    pub fn plan(cursor: &MatchCursor, from: Screen, route: &[Screen]) -> Result<Vec<Transition>> {
        let mut current = from;
        let mut transitions = Vec::new();

        for &target in route {
            if !cursor.shows(&target.marker()) {
                transitions.push(Transition::between(current, target)?);
            }
            current = target;
        }

        Ok(transitions)
    }

    /// Enter `to` unless the cursor already shows it
    pub fn enter<T: TransportTrait>(
        &self,
        matcher: &mut Matcher<T>,
        cursor: &MatchCursor,
        from: Screen,
        to: Screen,
    ) -> Result<MatchCursor> {
        if cursor.shows(&to.marker()) {
            debug!("Already on {}", to);
            return Ok(cursor.clone());
        }
        self.execute(matcher, &Transition::between(from, to)?)
    }

    /// Walk a route, returning the cursor of the last screen reached
    pub fn follow<T: TransportTrait>(
        &self,
        matcher: &mut Matcher<T>,
        cursor: &MatchCursor,
        from: Screen,
        route: &[Screen],
    ) -> Result<MatchCursor> {
        let mut last = cursor.clone();
        for transition in Self::plan(cursor, from, route)? {
            last = self.execute(matcher, &transition)?;
        }
        Ok(last)
    }

    /// Run a transition unconditionally
    pub fn execute<T: TransportTrait>(
        &self,
        matcher: &mut Matcher<T>,
        transition: &Transition,
    ) -> Result<MatchCursor> {
        debug!("Navigating {} -> {}", transition.from, transition.to);
        self.run(matcher, &transition.steps)?;

        if !transition.await_anchor {
            return Ok(MatchCursor::empty());
        }

        let anchor = transition.to.anchor();
        Ok(matcher.wait(&[anchor.as_str()], self.pacing.timeout)?.cursor)
    }

    /// Run bare steps
    pub fn run<T: TransportTrait>(&self, matcher: &mut Matcher<T>, steps: &[Step]) -> Result<()> {
        for step in steps {
            match step {
                Step::Send(keys) => matcher.send(keys)?,
                Step::SendPaced(keys) => matcher.send_paced(keys, self.pacing.key_delay)?,
                Step::Pause => pause(self.pacing.settle),
                Step::Expect(pattern) => {
                    matcher.wait(&[pattern.as_str()], self.pacing.timeout)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::simulator::{ResponseRule, VirtualInstrument};
    use crate::core::transcript::Transcript;

    const MODULE_ROUTE: [Screen; 5] = [
        Screen::Stopped,
        Screen::MainAcq,
        Screen::Acq(1),
        Screen::Exercisers,
        Screen::Registers,
    ];

    fn navigator() -> Navigator {
        Navigator::new(Pacing::immediate(Duration::from_millis(10)))
    }

    #[test]
    fn test_plan_from_extended_diagnostics() {
        let cursor = MatchCursor::new("EXTENDED DIAGNOSTICS");
        let plan = Navigator::plan(&cursor, Screen::ExtendedDiagnostics, &MODULE_ROUTE).unwrap();

        let targets: Vec<Screen> = plan.iter().map(|t| t.to).collect();
        assert_eq!(targets, MODULE_ROUTE);
        assert!(!plan[0].await_anchor);
        assert_eq!(plan[0].steps, vec![Step::Send("q".into())]);
        assert_eq!(plan[2].steps[3], Step::Send("a".into()));
    }

    #[test]
    fn test_plan_on_registers_is_empty() {
        let cursor = MatchCursor::new(" Stopped  Main Acq  Acq 1  Exercisers  Registers \x1b[2K");
        let plan = Navigator::plan(&cursor, Screen::Registers, &MODULE_ROUTE).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_plan_skips_only_shown_screens() {
        let cursor = MatchCursor::new(" Stopped  Main Acq  Acq 1 \x1b[2K");
        let route = [Screen::Stopped, Screen::MainAcq, Screen::Acq(2), Screen::Exercisers];
        let plan = Navigator::plan(&cursor, Screen::Acq(1), &route).unwrap();
        let targets: Vec<Screen> = plan.iter().map(|t| t.to).collect();
        assert_eq!(targets, [Screen::Acq(2), Screen::Exercisers]);
        assert_eq!(plan[0].steps[3], Step::Send("b".into()));
    }

    #[test]
    fn test_unknown_pair() {
        let err = Transition::between(Screen::Registers, Screen::MainAcq).unwrap_err();
        assert!(matches!(
            err,
            InstrumentError::NoTransition { from: Screen::Registers, to: Screen::MainAcq }
        ));
        assert!(Transition::lookup(Screen::MainAcq, Screen::Acq(3)).is_none());
    }

    #[test]
    fn test_enter_is_idempotent() {
        let device = VirtualInstrument::new("idle");
        let mut matcher = Matcher::new(device, Transcript::new());
        let cursor = MatchCursor::new(" Registers \x1b[2K");

        let after = navigator()
            .enter(&mut matcher, &cursor, Screen::Exercisers, Screen::Registers)
            .unwrap();

        assert_eq!(after, cursor);
        assert!(matcher.transport().sent().is_empty());
    }

    #[test]
    fn test_enter_waits_for_anchor() {
        let device = VirtualInstrument::new("acq")
            .with_rule(ResponseRule::reply("two", "2", b"\x1b[2K"))
            .with_rule(ResponseRule::reply("a", "a", b"\x1b[H Acq 1   boards\x1b[2K"));
        let mut matcher = Matcher::new(device, Transcript::new());

        let cursor = navigator()
            .enter(&mut matcher, &MatchCursor::new(" Main Acq "), Screen::MainAcq, Screen::Acq(1))
            .unwrap();

        assert!(cursor.shows(" Acq 1 "));
        assert_eq!(matcher.transport().keystrokes(), "2a");
    }

    #[test]
    fn test_missing_anchor_times_out() {
        let device = VirtualInstrument::new("silent");
        let mut matcher = Matcher::new(device, Transcript::new());

        let err = navigator()
            .enter(&mut matcher, &MatchCursor::empty(), Screen::Stopped, Screen::MainAcq)
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(matcher.transport().keystrokes(), "1d");
    }

    #[test]
    fn test_anchor_escapes_marker() {
        assert_eq!(Screen::Acq(2).anchor(), " Acq 2 .*\x1b\\[2K");
        assert_eq!(Screen::HardwareDebugger('a').anchor(), "Low-Level Hardware Debugger");
    }
}
