//! Virtual instrument
//!
//! Scriptable stand-in for the instrument. Every write is matched against a
//! list of response rules; the first enabled match queues its response for
//! the next reads. One-shot rules fire once, so a sequence of identical
//! keystrokes can be scripted with a different reply for each.
//!
//! Rules may be gated on a named state and move the instrument to another
//! one, which is enough to model the menu tree.

use super::transport::{TransportError, TransportStats, TransportTrait};
use bytes::Bytes;
use regex::Regex;
use std::collections::VecDeque;
use std::time::Duration;

/// Response rule condition
#[derive(Debug, Clone)]
pub enum MatchCondition {
    /// Match exact bytes
    Exact { bytes: Vec<u8> },
    /// Match text (substring)
    Text { text: String, case_sensitive: bool },
    /// Match regex
    Regex { pattern: String },
    /// Match any input
    Any,
}

impl MatchCondition {
    /// Check if data matches this condition
    pub fn matches(&self, data: &[u8]) -> bool {
        match self {
            Self::Exact { bytes } => data == bytes.as_slice(),
            Self::Text { text, case_sensitive } => {
                let data_str = String::from_utf8_lossy(data);
                if *case_sensitive {
                    data_str.contains(text.as_str())
                } else {
                    data_str.to_lowercase().contains(&text.to_lowercase())
                }
            }
            Self::Regex { pattern } => match Regex::new(pattern) {
                Ok(re) => re.is_match(&String::from_utf8_lossy(data)),
                Err(_) => false,
            },
            Self::Any => true,
        }
    }
}

/// Response rule
#[derive(Debug, Clone)]
pub struct ResponseRule {
    /// Rule name
    pub name: String,
    /// Match condition
    pub condition: MatchCondition,
    /// Bytes queued when the rule fires
    pub response: Vec<u8>,
    /// Priority (higher = checked first)
    pub priority: i32,
    /// Enabled
    pub enabled: bool,
    /// One-shot (disable after first match)
    pub one_shot: bool,
    /// Match count
    pub match_count: u64,
    /// Line rate the instrument listens at after firing
    pub then_listen_at: Option<u32>,
    /// Only match in this state
    pub state: Option<String>,
    /// State entered after firing
    pub next_state: Option<String>,
}

impl ResponseRule {
    /// Reply to an exact write, every time
    pub fn reply(name: &str, input: &str, response: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            condition: MatchCondition::Exact {
                bytes: input.as_bytes().to_vec(),
            },
            response: response.to_vec(),
            priority: 0,
            enabled: true,
            one_shot: false,
            match_count: 0,
            then_listen_at: None,
            state: None,
            next_state: None,
        }
    }

    /// Reply to an exact write, once
    pub fn once(name: &str, input: &str, response: &[u8]) -> Self {
        Self {
            one_shot: true,
            ..Self::reply(name, input, response)
        }
    }

    /// Reply to writes matching a regex
    pub fn pattern(name: &str, pattern: &str, response: &[u8]) -> Self {
        Self {
            condition: MatchCondition::Regex {
                pattern: pattern.to_string(),
            },
            ..Self::reply(name, "", response)
        }
    }

    /// Set priority
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Switch the listening line rate when fired
    #[must_use]
    pub fn then_listen_at(mut self, baud_rate: u32) -> Self {
        self.then_listen_at = Some(baud_rate);
        self
    }

    /// Only match while the instrument is in `state`
    #[must_use]
    pub fn in_state(mut self, state: &str) -> Self {
        self.state = Some(state.to_string());
        self
    }

    /// Move to `state` when fired
    #[must_use]
    pub fn goto(mut self, state: &str) -> Self {
        self.next_state = Some(state.to_string());
        self
    }

    fn applies(&self, state: &str, input: &[u8]) -> bool {
        self.enabled
            && self.state.as_deref().map_or(true, |s| s == state)
            && self.condition.matches(input)
    }
}

/// Scripted instrument implementing [`TransportTrait`]
pub struct VirtualInstrument {
    name: String,
    rules: Vec<ResponseRule>,
    state: String,
    pending: VecDeque<Bytes>,
    chunk_size: usize,
    baud_rate: u32,
    listen_baud: Option<u32>,
    sent: Vec<Vec<u8>>,
    stats: TransportStats,
}

impl VirtualInstrument {
    /// Create an instrument with no rules
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            rules: Vec::new(),
            state: String::new(),
            pending: VecDeque::new(),
            chunk_size: 1024,
            baud_rate: 9600,
            listen_baud: None,
            sent: Vec::new(),
            stats: TransportStats::default(),
        }
    }

    /// Main console answering the identity queries
    pub fn main_console(identity: &str, uid: Option<&str>) -> Self {
        let mut device = Self::new("main console");
        device.add_rule(ResponseRule::reply(
            "id",
            "ID?\n",
            format!("ID?\r\nID {}\r\n", identity).as_bytes(),
        ));
        if let Some(uid) = uid {
            device.add_rule(ResponseRule::reply(
                "uid",
                "UID?\n",
                format!("UID?\r\nUID {}\r\n", uid).as_bytes(),
            ));
        }
        device
    }

    /// Add a response rule
    pub fn add_rule(&mut self, rule: ResponseRule) {
        self.rules.push(rule);
        // Stable, so equal priorities keep insertion order
        self.rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// Builder form of [`add_rule`](Self::add_rule)
    #[must_use]
    pub fn with_rule(mut self, rule: ResponseRule) -> Self {
        self.add_rule(rule);
        self
    }

    /// Look up a rule by name
    pub fn rule(&self, name: &str) -> Option<&ResponseRule> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// Only respond to writes made at `baud_rate`
    pub fn listen_at(&mut self, baud_rate: u32) {
        self.listen_baud = Some(baud_rate);
    }

    /// Line rate the instrument is listening at
    pub fn listening_baud(&self) -> Option<u32> {
        self.listen_baud
    }

    /// Current state name
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Force the state
    pub fn set_state(&mut self, state: &str) {
        self.state = state.to_string();
    }

    /// Largest chunk a single read returns
    pub fn set_chunk_size(&mut self, size: usize) {
        self.chunk_size = size.max(1);
    }

    /// Queue output that arrives without any write
    pub fn preload(&mut self, data: &[u8]) {
        self.queue(data);
    }

    fn queue(&mut self, data: &[u8]) {
        for chunk in data.chunks(self.chunk_size) {
            self.pending.push_back(Bytes::copy_from_slice(chunk));
        }
    }

    /// Every write so far
    pub fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }

    /// Every write so far, concatenated
    pub fn keystrokes(&self) -> String {
        self.sent
            .iter()
            .map(|w| String::from_utf8_lossy(w))
            .collect()
    }

    /// Device name
    pub fn name(&self) -> &str {
        &self.name
    }

    fn process(&mut self, input: &[u8]) {
        if let Some(listen) = self.listen_baud {
            if listen != self.baud_rate {
                return;
            }
        }

        let state = self.state.clone();
        let Some(rule) = self.rules.iter_mut().find(|r| r.applies(&state, input)) else {
            return;
        };

        rule.match_count += 1;
        if rule.one_shot {
            rule.enabled = false;
        }
        let response = rule.response.clone();
        if let Some(baud) = rule.then_listen_at {
            self.listen_baud = Some(baud);
        }
        if let Some(next) = rule.next_state.clone() {
            self.state = next;
        }

        self.queue(&response);
    }
}

impl TransportTrait for VirtualInstrument {
    fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        self.sent.push(data.to_vec());
        self.stats.bytes_sent += data.len() as u64;
        self.stats.packets_sent += 1;
        self.process(data);
        Ok(data.len())
    }

    fn receive(&mut self, _timeout: Duration) -> Result<Bytes, TransportError> {
        match self.pending.pop_front() {
            Some(chunk) => {
                self.stats.bytes_received += chunk.len() as u64;
                self.stats.packets_received += 1;
                Ok(chunk)
            }
            None => Ok(Bytes::new()),
        }
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), TransportError> {
        self.baud_rate = baud_rate;
        self.stats.baud_changes += 1;
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn clear_input(&mut self) -> Result<(), TransportError> {
        self.pending.clear();
        Ok(())
    }

    fn connection_info(&self) -> String {
        format!("virtual:{} @ {} bps", self.name, self.baud_rate)
    }

    fn stats(&self) -> TransportStats {
        self.stats.clone()
    }
}
